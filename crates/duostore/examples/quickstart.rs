//! Quickstart for the duostore persistence engine.
//!
//! This example demonstrates:
//! - Declaring models with generated id, version and cache-index fields
//! - Storing and loading records through a [`Dao`] on both backends
//! - Optimistic concurrency surfacing as a write conflict
//! - Ad-hoc queries with filters, ordering and streaming
//! - Cache hit statistics after repeated loads
//!
//! # Running
//! ```bash
//! cargo run --example quickstart -p duostore
//! ```

use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duostore::core::model::{
    FieldDef, IdLength, ModelBuilder, ModelDescriptor, Registry, Value, ValueKind,
};
use duostore::core::storage::{StoreDriver, StoreError};
use duostore::{AttrStore, Config, Dao, KeyStore, LruCacheStore, QueryOp};

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    id: String,
    name: String,
    age: i32,
    nickname: String,
    version: i64,
}

fn person_model() -> ModelDescriptor<Person> {
    ModelBuilder::new("person")
        .field(
            FieldDef::new(
                "id",
                ValueKind::Str,
                |p: &Person| Value::Str(p.id.clone()),
                |p: &mut Person, v| {
                    p.id = v.try_into_string()?;
                    Ok(())
                },
            )
            .id()
            .generated_id(IdLength::Short),
        )
        .field(FieldDef::new(
            "name",
            ValueKind::Str,
            |p: &Person| Value::Str(p.name.clone()),
            |p: &mut Person, v| {
                p.name = v.try_into_string()?;
                Ok(())
            },
        ))
        .field(FieldDef::new(
            "age",
            ValueKind::Int,
            |p: &Person| Value::Int(p.age),
            |p: &mut Person, v| {
                p.age = v.try_into_int()?;
                Ok(())
            },
        ))
        .field(
            FieldDef::new(
                "nickname",
                ValueKind::Str,
                |p: &Person| Value::Str(p.nickname.clone()),
                |p: &mut Person, v| {
                    p.nickname = v.try_into_string()?;
                    Ok(())
                },
            )
            .cache_index(),
        )
        .field(
            FieldDef::new(
                "version",
                ValueKind::Long,
                |p: &Person| Value::Long(p.version),
                |p: &mut Person, v| {
                    p.version = v.try_into_long()?;
                    Ok(())
                },
            )
            .version(),
        )
        .build()
        .expect("person model is well-formed")
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Reading {
    sensor: String,
    ts: i64,
    celsius: i32,
}

fn reading_model() -> ModelDescriptor<Reading> {
    ModelBuilder::new("reading")
        .field(
            FieldDef::new(
                "sensor",
                ValueKind::Str,
                |r: &Reading| Value::Str(r.sensor.clone()),
                |r: &mut Reading, v| {
                    r.sensor = v.try_into_string()?;
                    Ok(())
                },
            )
            .id(),
        )
        .field(
            FieldDef::new(
                "ts",
                ValueKind::Long,
                |r: &Reading| Value::Long(r.ts),
                |r: &mut Reading, v| {
                    r.ts = v.try_into_long()?;
                    Ok(())
                },
            )
            .range_key(),
        )
        .field(FieldDef::new(
            "celsius",
            ValueKind::Int,
            |r: &Reading| Value::Int(r.celsius),
            |r: &mut Reading, v| {
                r.celsius = v.try_into_int()?;
                Ok(())
            },
        ))
        .build()
        .expect("reading model is well-formed")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duostore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let mut registry = Registry::new();
    registry.register(person_model())?;
    registry.register(reading_model())?;

    // One shared cache provider; entries are namespaced per backend and model.
    let cache = Arc::new(LruCacheStore::new(config.cache_max_entries));

    // ==================== Attribute store ====================

    let attr: Arc<dyn StoreDriver> = Arc::new(AttrStore::new().with_page_size(config.page_size));
    let people: Dao<Person> = Dao::new(&registry, attr, cache.clone())?;
    people.create_table().await?;

    let mut abc = Person {
        name: "abc".to_string(),
        age: 25,
        nickname: "ace".to_string(),
        ..Person::default()
    };
    people.put(&mut abc).await?;
    tracing::info!(id = %abc.id, version = abc.version, "Stored person");

    // A stale copy loses the conditional write.
    let mut stale = abc.clone();
    people.put(&mut abc).await?;
    match people.put(&mut stale).await {
        Err(StoreError::WriteConflict { .. }) => tracing::info!("Stale write rejected"),
        other => anyhow::bail!("expected a write conflict, got {other:?}"),
    }

    for (name, age, nickname) in [("def", 31, "dee"), ("ghi", 19, "gee")] {
        let mut person = Person {
            name: name.to_string(),
            age,
            nickname: nickname.to_string(),
            ..Person::default()
        };
        people.put(&mut person).await?;
    }

    let adults = people
        .query()
        .filter("age", QueryOp::Ge, 21)
        .order_by_desc("age")
        .all()
        .await?;
    for person in &adults {
        tracing::info!(name = %person.name, age = person.age, "Adult");
    }

    // Cache-index lookup and repeated loads served from cache.
    let dee = people.find_by("nickname", "dee").await?;
    tracing::info!(found = dee.is_some(), "Looked up by nickname");
    for _ in 0..3 {
        people.get(abc.id.clone()).await?;
    }
    let stats = people.cache().stats();
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.entries,
        "Cache statistics"
    );

    // ==================== Key store ====================

    let key: Arc<dyn StoreDriver> = Arc::new(KeyStore::new());
    let readings: Dao<Reading> = Dao::new(&registry, key, cache)?;
    readings.create_table().await?;

    let mut batch: Vec<Reading> = (0..5)
        .map(|i| Reading {
            sensor: "roof".to_string(),
            ts: 1_700_000_000 + i * 60,
            celsius: 18 + i as i32,
        })
        .collect();
    readings.batch_put(&mut batch).await?;

    // Direct key access: one hash key, a range over the range key.
    let stream = readings
        .query()
        .filter("sensor", QueryOp::Eq, "roof")
        .filter("ts", QueryOp::Ge, 1_700_000_060i64)
        .stream();
    tokio::pin!(stream);
    while let Some(reading) = stream.next().await {
        let reading = reading?;
        tracing::info!(ts = reading.ts, celsius = reading.celsius, "Reading");
    }

    readings.delete_with_range("roof", 1_700_000_000i64).await?;
    let remaining = readings
        .query()
        .filter("sensor", QueryOp::Eq, "roof")
        .count()
        .await?;
    tracing::info!(remaining, "Readings left after delete");

    Ok(())
}
