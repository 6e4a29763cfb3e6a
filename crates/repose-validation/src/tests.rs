#[cfg(test)]
mod tests {
    use crate::*;
    use bitflags::bitflags;
    use repose_observable::{
        ChangeSignal, ListOperation, ObservableList, ObservableMap, ObservableSet,
    };
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    bitflags! {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        struct PersonFields: u8 {
            const NAME = 1;
            const AGE = 1 << 1;
        }
    }

    struct PersonInner {
        name: RefCell<String>,
        age: Cell<u32>,
        error: ErrorState<String>,
        changed: ChangeSignal<Person, PropertyChange<PersonFields>>,
    }

    #[derive(Clone)]
    struct Person(Rc<PersonInner>);

    impl PartialEq for Person {
        fn eq(&self, other: &Self) -> bool {
            Rc::ptr_eq(&self.0, &other.0)
        }
    }

    impl Person {
        fn new(name: &str, age: u32) -> Self {
            Self(Rc::new(PersonInner {
                name: RefCell::new(name.to_string()),
                age: Cell::new(age),
                error: ErrorState::default(),
                changed: ChangeSignal::new(),
            }))
        }

        fn name(&self) -> String {
            self.0.name.borrow().clone()
        }

        fn age(&self) -> u32 {
            self.0.age.get()
        }

        fn set_name(&self, name: &str) {
            if *self.0.name.borrow() == name {
                return;
            }
            *self.0.name.borrow_mut() = name.to_string();
            self.0
                .changed
                .dispatch(self, &PropertyChange::fields(PersonFields::NAME));
        }

        fn set_age(&self, age: u32) {
            if self.0.age.replace(age) != age {
                self.0
                    .changed
                    .dispatch(self, &PropertyChange::fields(PersonFields::AGE));
            }
        }
    }

    impl ValidationTarget for Person {
        type Fields = PersonFields;
        type Error = String;

        fn error(&self) -> Option<String> {
            self.0.error.get()
        }

        fn set_error(&self, error: Option<String>) {
            let changed = self.0.error.replace(error);
            if !changed.is_empty() {
                self.0
                    .changed
                    .dispatch(self, &PropertyChange::validation(changed));
            }
        }

        fn property_changed(&self) -> &ChangeSignal<Self, PropertyChange<PersonFields>> {
            &self.0.changed
        }
    }

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    fn counting(calls: &Rc<Cell<usize>>, result: Option<&'static str>) -> ValidatorRef<Person> {
        let calls = calls.clone();
        ValidatorRef::from_fn(move |_: &Person| {
            calls.set(calls.get() + 1);
            result.map(String::from)
        })
    }

    // target

    #[test]
    fn test_error_state_reports_changed_fields() {
        let state: ErrorState<String> = ErrorState::default();
        assert_eq!(
            state.replace(Some("bad".into())),
            ValidationProps::ERROR | ValidationProps::IS_VALID | ValidationProps::IS_INVALID
        );
        assert_eq!(state.replace(Some("worse".into())), ValidationProps::ERROR);
        assert_eq!(state.replace(Some("worse".into())), ValidationProps::empty());
        assert_eq!(state.get().as_deref(), Some("worse"));
        assert_eq!(
            state.replace(None),
            ValidationProps::ERROR | ValidationProps::IS_VALID | ValidationProps::IS_INVALID
        );
    }

    #[test]
    fn test_target_trigger_ignores_validation_fields() {
        let person = Person::new("ada", 36);
        let trigger = TargetTrigger::new(&person);
        let fired = counter();
        let _sub = trigger.validation_triggered().subscribe_scoped({
            let fired = fired.clone();
            move |_, _| fired.set(fired.get() + 1)
        });

        person.set_error(Some("bad".into()));
        assert_eq!(fired.get(), 0);
        person.set_name("grace");
        assert_eq!(fired.get(), 1);
        person.set_name("grace");
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_trigger_ref_equality_by_source_and_kind() {
        let items = ObservableList::from(vec![1, 2]);
        let other = ObservableList::from(vec![1, 2]);
        assert_eq!(TriggerRef::list(&items), TriggerRef::list(&items));
        assert_ne!(TriggerRef::list(&items), TriggerRef::list(&other));
        assert_ne!(TriggerRef::list(&items), TriggerRef::list_reorder(&items));
        assert_eq!(TriggerRef::list(&items).key().kind, TriggerKind::ListChange);
    }

    #[test]
    fn test_item_triggers_keyed_by_container() {
        let kids = ObservableList::from(vec![Person::new("kid", 3)]);
        let by_target = TriggerRef::list_items(&kids, |p: &Person| Some(TriggerRef::target(p)));
        let nothing = TriggerRef::list_items(&kids, |_: &Person| None);
        assert_eq!(by_target, nothing);
        assert_eq!(by_target.key().kind, TriggerKind::ListItems);

        let triggers: ObservableSet<TriggerRef> = ObservableSet::new();
        triggers.add(by_target);
        assert!(!triggers.add(nothing));
        assert_eq!(triggers.len(), 1);
    }

    #[test]
    fn test_dropping_trigger_unsubscribes() {
        let items = ObservableList::from(vec![1]);
        let trigger = TriggerRef::list(&items);
        assert_eq!(items.changed().subscriber_count(), 1);
        drop(trigger);
        assert_eq!(items.changed().subscriber_count(), 0);
    }

    // validator

    #[test]
    fn test_chain_stops_at_first_error() {
        init_logger();
        let person = Person::new("ada", 36);
        let validator = ObjectValidator::new(person.clone());
        let calls = Rc::new(RefCell::new(Vec::new()));
        for (i, result) in [None, None, Some("E"), None].into_iter().enumerate() {
            let calls = calls.clone();
            validator.add_fn(
                move |_| {
                    calls.borrow_mut().push(i);
                    result.map(String::from)
                },
                [],
            );
        }

        calls.borrow_mut().clear();
        assert_eq!(validator.validate().as_deref(), Some("E"));
        assert_eq!(*calls.borrow(), vec![0, 1, 2]);
        assert_eq!(person.error().as_deref(), Some("E"));
        assert!(person.is_invalid());
    }

    #[test]
    fn test_writing_error_does_not_revalidate() {
        init_logger();
        let person = Person::new("ada", 36);
        let validator = ObjectValidator::new(person.clone());
        let calls = counter();
        validator.add(counting(&calls, Some("E")), []);
        assert_eq!(calls.get(), 1);
        assert_eq!(person.error().as_deref(), Some("E"));

        validator.validate();
        validator.validate();
        assert_eq!(calls.get(), 3);
        assert_eq!(person.error().as_deref(), Some("E"));
    }

    #[test]
    fn test_target_field_change_revalidates() {
        let person = Person::new("ada", 36);
        let validator = ObjectValidator::new(person.clone());
        validator.add_fn(
            |p: &Person| p.name().is_empty().then(|| "name required".to_string()),
            [],
        );
        assert!(person.is_valid());

        person.set_name("");
        assert_eq!(person.error().as_deref(), Some("name required"));
        person.set_name("grace");
        assert!(person.is_valid());
    }

    #[test]
    fn test_custom_target_predicate() {
        let person = Person::new("ada", 36);
        let predicate: TargetPredicate<Person> =
            Rc::new(|_: &Person, change: &PropertyChange<PersonFields>| {
                change.fields.contains(PersonFields::AGE)
            });
        let validator = ObjectValidator::with_config(
            person.clone(),
            ValidatorConfig {
                should_target_trigger_validation: Some(predicate),
                ..ValidatorConfig::default()
            },
        );
        let calls = counter();
        validator.add(counting(&calls, None), []);
        calls.set(0);

        person.set_name("grace");
        assert_eq!(calls.get(), 0);
        person.set_age(37);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_reentrant_request_reruns_pass() {
        init_logger();
        let person = Person::new("ada", 36);
        let anything: TargetPredicate<Person> =
            Rc::new(|_: &Person, _: &PropertyChange<PersonFields>| true);
        let validator = ObjectValidator::with_config(
            person.clone(),
            ValidatorConfig {
                should_target_trigger_validation: Some(anything),
                max_passes: 8,
            },
        );
        let calls = counter();
        validator.add(counting(&calls, Some("E")), []);
        // the error write asks again once; the second pass writes the same error
        assert_eq!(calls.get(), 2);
        assert_eq!(person.error().as_deref(), Some("E"));
    }

    #[test]
    fn test_reentrant_requests_stop_at_max_passes() {
        init_logger();
        let person = Person::new("ada", 36);
        let anything: TargetPredicate<Person> =
            Rc::new(|_: &Person, _: &PropertyChange<PersonFields>| true);
        let validator = ObjectValidator::with_config(
            person.clone(),
            ValidatorConfig {
                should_target_trigger_validation: Some(anything),
                max_passes: 3,
            },
        );
        let calls = counter();
        validator.add_fn(
            {
                let calls = calls.clone();
                move |_| {
                    calls.set(calls.get() + 1);
                    Some(format!("E{}", calls.get()))
                }
            },
            [],
        );
        assert_eq!(calls.get(), 3);
        assert_eq!(person.error().as_deref(), Some("E3"));
    }

    #[test]
    fn test_duplicate_triggers_collapse() {
        init_logger();
        let person = Person::new("ada", 36);
        let items = ObservableList::from(vec![1, 2]);
        let validator = ObjectValidator::new(person.clone());
        let first = counter();
        let second = counter();
        validator.add(counting(&first, None), [TriggerRef::list(&items)]);
        validator.add(counting(&second, None), [TriggerRef::list(&items)]);

        assert_eq!(validator.triggers().len(), 1);
        assert_eq!(items.changed().subscriber_count(), 1);

        first.set(0);
        second.set(0);
        items.push(3);
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn test_add_runs_a_single_pass() {
        let person = Person::new("ada", 36);
        let items = ObservableList::from(vec![1]);
        let tags: ObservableSet<&str> = ObservableSet::new();
        let validator = ObjectValidator::new(person.clone());
        let existing = counter();
        validator.add(counting(&existing, None), []);
        existing.set(0);

        let added = counter();
        validator.add(
            counting(&added, Some("bad")),
            [TriggerRef::list(&items), TriggerRef::set(&tags)],
        );
        assert_eq!(existing.get(), 1);
        assert_eq!(added.get(), 1);
        assert_eq!(validator.triggers().len(), 2);
        assert_eq!(person.error().as_deref(), Some("bad"));
    }

    #[test]
    fn test_panicking_validator_leaves_validator_usable() {
        let person = Person::new("ada", 36);
        let validator = ObjectValidator::new(person.clone());
        let panics = Rc::new(Cell::new(true));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let panics = panics.clone();
            validator.add_fn(
                move |_| {
                    if panics.get() {
                        panic!("validator failed");
                    }
                    Some("E".to_string())
                },
                [],
            );
        }));
        assert!(result.is_err());
        assert!(person.is_valid());

        panics.set(false);
        assert_eq!(validator.validate().as_deref(), Some("E"));
        assert_eq!(person.error().as_deref(), Some("E"));
        person.set_name("grace");
        assert_eq!(validator.validators().len(), 1);
        assert!(person.is_invalid());
    }

    struct Lifecycle {
        added: Rc<Cell<usize>>,
        removed: Rc<Cell<usize>>,
    }

    impl Validator<Person> for Lifecycle {
        fn on_add(&self, _target: &Person) {
            self.added.set(self.added.get() + 1);
        }

        fn on_remove(&self, _target: &Person) {
            self.removed.set(self.removed.get() + 1);
        }

        fn validate(&self, _target: &Person) -> Option<String> {
            Some("bad".into())
        }
    }

    #[test]
    fn test_reset_clears_chain_and_triggers() {
        let person = Person::new("ada", 36);
        let items = ObservableList::from(vec![1]);
        let tags: ObservableSet<&str> = ObservableSet::new();
        let validator = ObjectValidator::new(person.clone());
        let added = counter();
        let removed = counter();
        validator.add(
            ValidatorRef::new(Lifecycle {
                added: added.clone(),
                removed: removed.clone(),
            }),
            [TriggerRef::list(&items), TriggerRef::set(&tags)],
        );
        assert_eq!(added.get(), 1);
        assert!(person.is_invalid());
        assert_eq!(validator.triggers().len(), 2);

        validator.reset();
        assert_eq!(removed.get(), 1);
        assert!(person.is_valid());
        assert!(validator.validators().is_empty());
        assert!(validator.triggers().is_empty());
        assert_eq!(items.changed().subscriber_count(), 0);
        assert_eq!(tags.changed().subscriber_count(), 0);
        // the target is still watched
        assert_eq!(person.property_changed().subscriber_count(), 1);
    }

    #[test]
    fn test_reset_on_empty_chain_clears_error() {
        let person = Person::new("ada", 36);
        person.set_error(Some("stale".into()));
        let validator = ObjectValidator::new(person.clone());
        validator.reset();
        assert!(person.is_valid());
    }

    #[test]
    fn test_remove_validator() {
        let person = Person::new("ada", 36);
        let validator = ObjectValidator::new(person.clone());
        let calls = counter();
        let failing = counting(&calls, Some("bad"));
        validator.add(failing.clone(), []);
        assert!(person.is_invalid());

        assert!(validator.remove(&failing));
        assert!(person.is_valid());
        assert!(!validator.remove(&failing));
    }

    #[test]
    fn test_editing_chain_directly_revalidates() {
        let person = Person::new("ada", 36);
        let validator = ObjectValidator::new(person.clone());
        let calls = counter();
        validator.validators().push(counting(&calls, Some("bad")));
        assert_eq!(calls.get(), 1);
        assert!(person.is_invalid());

        // order decides which error wins
        validator.validators().insert(0, counting(&calls, Some("first"))).unwrap();
        assert_eq!(person.error().as_deref(), Some("first"));
        validator.validators().reverse();
        assert_eq!(person.error().as_deref(), Some("bad"));
    }

    #[test]
    fn test_list_trigger_predicate() {
        let person = Person::new("ada", 36);
        let items = ObservableList::from(vec![3, 1, 2]);
        let validator = ObjectValidator::new(person.clone());
        let calls = counter();
        validator.add(
            counting(&calls, None),
            [
                TriggerRef::new(ListChangeTrigger::with_predicate(&items, |_, change| {
                    change.operation == ListOperation::Add
                })),
                TriggerRef::list_reorder(&items),
            ],
        );
        calls.set(0);

        items.push(4);
        assert_eq!(calls.get(), 1);
        items.pop();
        assert_eq!(calls.get(), 1);
        items.sort();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_set_and_map_triggers() {
        let person = Person::new("ada", 36);
        let tags: ObservableSet<&str> = ObservableSet::new();
        let scores: ObservableMap<&str, u32> = ObservableMap::new();
        let validator = ObjectValidator::new(person.clone());
        let calls = counter();
        validator.add(
            counting(&calls, None),
            [TriggerRef::set(&tags), TriggerRef::map(&scores)],
        );
        calls.set(0);

        tags.add("x");
        tags.add("x");
        assert_eq!(calls.get(), 1);
        scores.insert("a", 1);
        scores.insert("a", 1);
        assert_eq!(calls.get(), 2);
        scores.remove(&"a");
        assert_eq!(calls.get(), 3);
    }

    // item triggers

    #[test]
    fn test_list_items_refcount_duplicates() {
        let kid = Person::new("kid", 3);
        let kids = ObservableList::from(vec![kid.clone(), kid.clone()]);
        let trigger = ListItemTrigger::new(&kids, |p: &Person| Some(TriggerRef::target(p)));
        assert_eq!(trigger.watched_count(), 1);
        assert_eq!(kid.property_changed().subscriber_count(), 1);

        let fired = counter();
        let _sub = trigger.validation_triggered().subscribe_scoped({
            let fired = fired.clone();
            move |_, _| fired.set(fired.get() + 1)
        });

        kid.set_age(4);
        assert_eq!(fired.get(), 1);

        kids.remove(0).unwrap();
        assert_eq!(fired.get(), 2);
        assert_eq!(trigger.watched_count(), 1);
        kid.set_age(5);
        assert_eq!(fired.get(), 3);

        kids.clear();
        assert_eq!(fired.get(), 4);
        assert_eq!(trigger.watched_count(), 0);
        assert_eq!(kid.property_changed().subscriber_count(), 0);
        kid.set_age(6);
        assert_eq!(fired.get(), 4);
    }

    #[test]
    fn test_list_items_skip_items_without_trigger() {
        let adult = Person::new("adult", 40);
        let kid = Person::new("kid", 3);
        let people = ObservableList::from(vec![adult.clone(), kid.clone()]);
        let trigger = ListItemTrigger::new(&people, |p: &Person| {
            (p.age() < 18).then(|| TriggerRef::target(p))
        });
        assert_eq!(trigger.watched_count(), 1);
        assert_eq!(adult.property_changed().subscriber_count(), 0);
    }

    #[test]
    fn test_validator_over_list_items() {
        init_logger();
        let parent = Person::new("parent", 40);
        let kid = Person::new("kid", 3);
        let kids = ObservableList::from(vec![kid.clone()]);
        let validator = ObjectValidator::new(parent.clone());
        validator.add_fn(
            {
                let kids = kids.clone();
                move |_| {
                    kids.with(|kids| kids.iter().any(|k| k.age() >= 18))
                        .then(|| "kids only".to_string())
                }
            },
            [TriggerRef::list_items(&kids, |p: &Person| Some(TriggerRef::target(p)))],
        );
        assert!(parent.is_valid());

        kid.set_age(20);
        assert_eq!(parent.error().as_deref(), Some("kids only"));
        kids.clear();
        assert!(parent.is_valid());
    }

    #[test]
    fn test_set_items_trigger() {
        let kid = Person::new("kid", 3);
        let names: ObservableSet<&str> = ObservableSet::new();
        names.add("kid");
        let trigger = SetItemTrigger::new(&names, {
            let kid = kid.clone();
            move |name: &&str| (*name == "kid").then(|| TriggerRef::target(&kid))
        });
        assert_eq!(trigger.watched_count(), 1);
        let fired = counter();
        let _sub = trigger.validation_triggered().subscribe_scoped({
            let fired = fired.clone();
            move |_, _| fired.set(fired.get() + 1)
        });

        kid.set_age(4);
        assert_eq!(fired.get(), 1);
        names.delete(&"kid");
        assert_eq!(fired.get(), 2);
        assert_eq!(trigger.watched_count(), 0);
    }

    #[test]
    fn test_map_items_refcount_duplicates() {
        let kid = Person::new("kid", 3);
        let seats: ObservableMap<u32, Person> = ObservableMap::new();
        seats.insert(1, kid.clone());
        seats.insert(2, kid.clone());
        let trigger = MapItemTrigger::new(&seats, |p: &Person| Some(TriggerRef::target(p)));
        assert_eq!(trigger.watched_count(), 1);
        let fired = counter();
        let _sub = trigger.validation_triggered().subscribe_scoped({
            let fired = fired.clone();
            move |_, _| fired.set(fired.get() + 1)
        });

        kid.set_name("kiddo");
        assert_eq!(fired.get(), 1);

        seats.remove(&1);
        assert_eq!(trigger.watched_count(), 1);
        let other = Person::new("other", 5);
        seats.insert(2, other.clone());
        assert_eq!(trigger.watched_count(), 1);
        assert_eq!(kid.property_changed().subscriber_count(), 0);
        assert_eq!(other.property_changed().subscriber_count(), 1);
    }

    #[test]
    fn test_dropping_validator_releases_sources() {
        let person = Person::new("ada", 36);
        let items = ObservableList::from(vec![1]);
        let validator = ObjectValidator::new(person.clone());
        validator.add_fn(|_| None, [TriggerRef::list(&items)]);
        assert_eq!(items.changed().subscriber_count(), 1);
        assert_eq!(person.property_changed().subscriber_count(), 1);

        drop(validator);
        assert_eq!(items.changed().subscriber_count(), 0);
        assert_eq!(person.property_changed().subscriber_count(), 0);
    }
}
