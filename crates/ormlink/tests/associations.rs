//! hasMany, extendsTo, association hooks and accessors by method name.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use asupersync::runtime::RuntimeBuilder;

use common::{create, drivers, names, people, unwrap_outcome};
use ormlink::prelude::*;
use ormlink_memory::MemoryDriver;

fn kennel(driver: &Arc<MemoryDriver>) -> (Registry, Model, Model) {
    let registry = Registry::new(driver.clone());
    let person = registry
        .define(
            "person",
            vec![Property::new("name", PropertyType::Text)],
            ModelOptions::new(),
        )
        .expect("define person");
    let pet = registry
        .define(
            "pet",
            vec![Property::new("name", PropertyType::Text)],
            ModelOptions::new(),
        )
        .expect("define pet");
    person
        .has_many("pets", &pet, AssociationOptions::new().reverse("keepers"))
        .expect("declare person.pets");
    (registry, person, pet)
}

#[test]
fn has_many_set_add_has_remove() {
    for driver in drivers() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let (registry, person, pet) = kennel(&driver);
            unwrap_outcome(registry.sync(&cx).await).expect("sync");
            assert!(driver.has_table("person_pets"));

            let john = create(&cx, &person, "John").await;
            let jane = create(&cx, &person, "Jane").await;
            let deco = create(&cx, &pet, "Deco").await;
            let fido = create(&cx, &pet, "Fido").await;
            let rex = create(&cx, &pet, "Rex").await;

            let pets = john.related("pets").unwrap();
            unwrap_outcome(pets.set(&cx, [&deco, &fido]).await).expect("set pets");
            let got = unwrap_outcome(pets.get(&cx).await).expect("get pets");
            assert_eq!(names(&got), vec!["Deco", "Fido"]);

            unwrap_outcome(pets.add(&cx, &rex).await).expect("add rex");
            unwrap_outcome(pets.add(&cx, &rex).await).expect("add rex twice");
            assert_eq!(driver.row_count("person_pets"), Some(3));
            assert!(unwrap_outcome(pets.has_targets(&cx, [&deco, &rex]).await).expect("has"));

            unwrap_outcome(pets.remove_targets(&cx, &deco).await).expect("remove deco");
            assert!(!unwrap_outcome(pets.has_targets(&cx, &deco).await).expect("has deco"));
            assert!(
                !unwrap_outcome(pets.has_targets(&cx, [&deco, &fido]).await)
                    .expect("has deco and fido")
            );
            let got = unwrap_outcome(pets.get(&cx).await).expect("get pets");
            assert_eq!(names(&got), vec!["Fido", "Rex"]);

            // reverse side reads the same join table
            let keepers = rex.related("keepers").unwrap();
            unwrap_outcome(keepers.add(&cx, &jane).await).expect("jane keeps rex");
            let got = unwrap_outcome(keepers.get(&cx).await).expect("get keepers");
            assert_eq!(names(&got), vec!["Jane", "John"]);

            let filtered = unwrap_outcome(
                keepers
                    .get_where(&cx, Conditions::new().eq("name", "Jane"))
                    .await,
            )
            .expect("filtered keepers");
            assert_eq!(filtered, vec![jane.clone()]);

            let fido_people = unwrap_outcome(
                person
                    .find(Conditions::new().related("pets", &fido))
                    .run(&cx)
                    .await,
            )
            .expect("find by pets");
            assert_eq!(fido_people, vec![john.clone()]);

            // john keeps both, and is listed once
            let keeping_either = unwrap_outcome(
                person
                    .find(Conditions::new().related("pets", [&fido, &rex]))
                    .run(&cx)
                    .await,
            )
            .expect("find by several pets");
            assert_eq!(names(&keeping_either), vec!["Jane", "John"]);

            // replacing keeps links that stay and drops the rest
            unwrap_outcome(pets.set(&cx, [&rex, &deco]).await).expect("replace pets");
            let got = unwrap_outcome(pets.get(&cx).await).expect("get pets");
            assert_eq!(names(&got), vec!["Deco", "Rex"]);

            unwrap_outcome(pets.remove(&cx).await).expect("remove all");
            unwrap_outcome(pets.remove(&cx).await).expect("remove all again");
            assert!(!unwrap_outcome(pets.has(&cx).await).expect("has pets"));
            assert_eq!(driver.row_count("person_pets"), Some(1));
        });
    }
}

#[test]
fn has_many_rows_follow_deleted_instances() {
    let driver = Arc::new(MemoryDriver::relational());
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let (registry, person, pet) = kennel(&driver);
        unwrap_outcome(registry.sync(&cx).await).expect("sync");
        let john = create(&cx, &person, "John").await;
        let deco = create(&cx, &pet, "Deco").await;
        unwrap_outcome(john.related("pets").unwrap().add(&cx, &deco).await).expect("add");

        unwrap_outcome(deco.remove(&cx).await).expect("remove deco");
        assert_eq!(deco.status(), InstanceStatus::Detached);
        assert_eq!(driver.row_count("person_pets"), Some(0));
        assert!(!unwrap_outcome(john.related("pets").unwrap().has(&cx).await).expect("has"));
    });
}

#[test]
fn extends_to_shares_the_source_key() {
    for driver in drivers() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let registry = Registry::new(driver.clone());
            let person = registry
                .define(
                    "person",
                    vec![Property::new("name", PropertyType::Text)],
                    ModelOptions::new(),
                )
                .expect("define person");
            let address = registry
                .define(
                    "address",
                    vec![Property::new("city", PropertyType::Text)],
                    ModelOptions::new(),
                )
                .expect("define address");
            person
                .extends_to("address", &address, AssociationOptions::new().reverse("resident"))
                .expect("declare person.address");
            unwrap_outcome(registry.sync(&cx).await).expect("sync");

            let john = create(&cx, &person, "John").await;
            let accessor = john.related("address").unwrap();

            match accessor.get(&cx).await {
                Outcome::Err(e) => assert!(e.is_not_found(), "unexpected error {e}"),
                _ => panic!("extendsTo get must fail when nothing is linked"),
            }
            assert!(!unwrap_outcome(accessor.has(&cx).await).expect("has address"));

            let home = address
                .new_instance(Row::new().with("city", "Lisbon"))
                .expect("new address");
            unwrap_outcome(accessor.set(&cx, &home).await).expect("set address");
            assert_eq!(home.status(), InstanceStatus::Persistent);
            assert_eq!(home.key(), john.key());
            let got = unwrap_outcome(accessor.get(&cx).await).expect("get address");
            assert_eq!(got, vec![home.clone()]);

            let resident = unwrap_outcome(home.related("resident").unwrap().get_one(&cx).await)
                .expect("get resident");
            assert_eq!(resident, Some(john.clone()));

            let work = address
                .new_instance(Row::new().with("city", "Porto"))
                .expect("new address");
            unwrap_outcome(accessor.set(&cx, &work).await).expect("replace address");
            assert_eq!(driver.row_count("address"), Some(1));
            assert_eq!(work.key(), john.key());
            let got = unwrap_outcome(accessor.get_one(&cx).await).expect("get address");
            assert_eq!(got.map(|a| a.get("city")), Some(Value::from("Porto")));

            let add = accessor.add(&cx, &home).await;
            assert!(matches!(add, Outcome::Err(Error::Definition(_))));

            let jane = create(&cx, &person, "Jane").await;
            let taken = jane.related("address").unwrap().set(&cx, &work).await;
            match taken {
                Outcome::Err(Error::Validation(err)) => {
                    let first = err.first().expect("one field error");
                    assert_eq!(first.kind, ValidationErrorKind::State);
                }
                Outcome::Err(other) => panic!("expected a state error, got {other}"),
                _ => panic!("linking another person's address must fail"),
            }
            let rehome = work.related("resident").unwrap().set(&cx, &jane).await;
            assert!(matches!(rehome, Outcome::Err(Error::Definition(_))));
            assert_eq!(work.key(), john.key());

            unwrap_outcome(accessor.remove(&cx).await).expect("remove address");
            unwrap_outcome(accessor.remove(&cx).await).expect("remove address again");
            assert_eq!(driver.row_count("address"), Some(0));

            let flat = address
                .new_instance(Row::new().with("city", "Faro"))
                .expect("new address");
            unwrap_outcome(jane.related("address").unwrap().set(&cx, &flat).await)
                .expect("set jane's address");
            assert_eq!(flat.key(), jane.key());
            unwrap_outcome(jane.remove(&cx).await).expect("remove jane");
            let left = if driver.config().checks_foreign_keys() { 0 } else { 1 };
            assert_eq!(driver.row_count("address"), Some(left));
        });
    }
}

#[test]
fn association_hooks_wrap_replacement_and_removal() {
    for driver in drivers() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        let saves = Arc::new(AtomicUsize::new(0));
        let removes = Arc::new(AtomicUsize::new(0));
        let after_removes = Arc::new(AtomicUsize::new(0));
        let hooks = {
            let saves = Arc::clone(&saves);
            let removes = Arc::clone(&removes);
            let after_removes = Arc::clone(&after_removes);
            Hooks::new()
                .before_save(move |_| {
                    saves.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .before_remove(move |_| {
                    removes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .after_remove(move |_| {
                    after_removes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
        };

        rt.block_on(async {
            let p = people(&driver, AssociationOptions::new().hooks(hooks));
            unwrap_outcome(p.registry.sync(&cx).await).expect("sync");
            let john = create(&cx, &p.person, "John").await;
            let deco = create(&cx, &p.pet, "Deco").await;
            let fido = create(&cx, &p.pet, "Fido").await;
            let pet = john.related("pet").unwrap();

            unwrap_outcome(pet.set(&cx, &deco).await).expect("set deco");
            assert_eq!(saves.load(Ordering::SeqCst), 1);
            assert_eq!(removes.load(Ordering::SeqCst), 0);

            unwrap_outcome(pet.set(&cx, &fido).await).expect("replace with fido");
            assert_eq!(saves.load(Ordering::SeqCst), 2);
            assert_eq!(removes.load(Ordering::SeqCst), 1);
            assert_eq!(after_removes.load(Ordering::SeqCst), 1);

            unwrap_outcome(pet.set(&cx, &fido).await).expect("set fido again");
            assert_eq!(saves.load(Ordering::SeqCst), 3);
            assert_eq!(removes.load(Ordering::SeqCst), 1);
            assert_eq!(after_removes.load(Ordering::SeqCst), 1);

            let keepers = fido.related("owners").unwrap();
            unwrap_outcome(keepers.set(&cx, &john).await).expect("set the same owner");
            assert_eq!(removes.load(Ordering::SeqCst), 1);

            unwrap_outcome(pet.remove(&cx).await).expect("remove");
            assert_eq!(removes.load(Ordering::SeqCst), 2);
            assert_eq!(after_removes.load(Ordering::SeqCst), 2);

            unwrap_outcome(pet.remove(&cx).await).expect("remove again");
            assert_eq!(removes.load(Ordering::SeqCst), 2);
        });
    }
}

#[test]
fn failing_before_hook_stops_the_link() {
    let driver = Arc::new(MemoryDriver::relational());
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    let hooks = Hooks::new().before_save(|_| Err(Error::definition("links are frozen")));
    rt.block_on(async {
        let p = people(&driver, AssociationOptions::new().hooks(hooks));
        unwrap_outcome(p.registry.sync(&cx).await).expect("sync");
        let john = create(&cx, &p.person, "John").await;
        let deco = create(&cx, &p.pet, "Deco").await;

        let before = driver.operation_count();
        let result = john.related("pet").unwrap().set(&cx, &deco).await;
        assert!(matches!(result, Outcome::Err(Error::Definition(_))));
        assert_eq!(driver.operation_count(), before);
        assert!(john.get("pet_id").is_null());
    });
}

#[test]
fn accessors_by_method_name() {
    for driver in drivers() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let p = people(&driver, AssociationOptions::new());
            unwrap_outcome(p.registry.sync(&cx).await).expect("sync");
            let john = create(&cx, &p.person, "John").await;
            let deco = create(&cx, &p.pet, "Deco").await;

            let has = unwrap_outcome(deco.call(&cx, "hasOwners", AccessorArgs::none()).await)
                .expect("hasOwners");
            assert_eq!(has.as_bool(), Some(false));

            deco.call_async(&cx, "setOwnersAsync", AccessorArgs::targets(&john))
                .await
                .expect("setOwnersAsync");

            let got = deco
                .call_async(&cx, "getOwnersAsync", AccessorArgs::none())
                .await
                .expect("getOwnersAsync")
                .into_instances();
            assert_eq!(got, vec![john.clone()]);

            let mut seen = None;
            john.call_cb(&cx, "hasPet", AccessorArgs::targets(&deco), |r| seen = Some(r))
                .await;
            let has_pet = seen.expect("callback fired").expect("hasPet");
            assert_eq!(has_pet.as_bool(), Some(true));

            let missing = john.call(&cx, "addPet", AccessorArgs::none()).await;
            assert!(matches!(missing, Outcome::Err(Error::Definition(_))));
        });
    }
}
