#![allow(dead_code)]

use std::sync::Arc;

use asupersync::Outcome;

use ormlink::prelude::*;
use ormlink_memory::MemoryDriver;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> std::result::Result<T, String> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(format!("unexpected error: {e}")),
        Outcome::Cancelled(r) => Err(format!("cancelled: {r:?}")),
        Outcome::Panicked(p) => Err(format!("panicked: {p:?}")),
    }
}

/// One driver per memory flavor.
pub fn drivers() -> Vec<Arc<MemoryDriver>> {
    vec![
        Arc::new(MemoryDriver::relational()),
        Arc::new(MemoryDriver::document()),
    ]
}

pub struct People {
    pub registry: Registry,
    pub person: Model,
    pub pet: Model,
}

/// `person.has_one("pet", pet)` with reverse `owners` and a `pet_id` column.
pub fn people(driver: &Arc<MemoryDriver>, options: AssociationOptions) -> People {
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
        .has_one("pet", &pet, options.reverse("owners").field(["pet_id"]))
        .expect("declare person.pet");
    People {
        registry,
        person,
        pet,
    }
}

pub async fn create(cx: &Cx, model: &Model, name: &str) -> Instance {
    unwrap_outcome(model.create(cx, Row::new().with("name", name)).await)
        .unwrap_or_else(|e| panic!("create {name}: {e}"))
}

/// Key value of a single-key instance.
pub fn key_of(instance: &Instance) -> Value {
    instance.get(&instance.model().key()[0])
}

/// Sorted `name` values.
pub fn names(instances: &[Instance]) -> Vec<String> {
    let mut names: Vec<String> = instances
        .iter()
        .filter_map(|i| i.get("name").as_str().map(str::to_string))
        .collect();
    names.sort();
    names
}
