extern crate rust_plastic;

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use rust_plastic::plastic::{PlasticClass, UniqueId};
use rust_plastic::Result;

use common::*;

#[test]
fn concurrent_ids_are_unique() {
    let ids = Arc::new(UniqueId::new());
    let names: Vec<String> = thread::scope(|scope| {
        let workers: Vec<_> = (0..10)
            .map(|_| {
                let ids = ids.clone();
                scope.spawn(move || (0..1_000).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect()
    });

    assert_eq!(10_000, names.len());
    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(10_000, unique.len());
    assert!(names.iter().all(|name| name.chars().all(|c| c.is_ascii_alphanumeric())));
}

#[test]
fn classes_created_concurrently_get_distinct_names() {
    let manager = manager();
    let names: Vec<String> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let manager = &manager;
                scope.spawn(move || {
                    (0..25)
                        .map(|_| {
                            let empty = |_: &mut PlasticClass| -> Result<()> { Ok(()) };
                            let mut transformation =
                                manager.create_class("java.lang.Object", empty).unwrap();
                            let instantiator = transformation.create_instantiator().unwrap();
                            instantiator.class_name().to_string()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect()
    });

    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(200, unique.len());
    for name in &names {
        assert!(name.starts_with("java.lang.Object$Plastic_"), "{}", name);
        assert!(manager.class_loader().is_loaded(name), "{}", name);
    }
}

