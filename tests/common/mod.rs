//! Shared fixtures: a fruit catalog schema with a lazily loaded scalar and
//! a lazy entity reference.

#![allow(dead_code)]

use groundwork::{
    AuditStamp, Capabilities, Entity, EntityMapping, EntityState, Lazy, PropertyValue, Query,
    SessionFactory, SessionFactoryConfig,
};
use groundwork::model::SoftDeleteStamp;
use rusqlite::types::Value;
use rusqlite::Row;
use std::sync::Arc;

pub const NUTRITIONS_DDL: &str = "CREATE TABLE Nutritions (
    NutritionId INTEGER PRIMARY KEY AUTOINCREMENT,
    Sugar REAL NOT NULL,
    Carbohydrates REAL NOT NULL
)";

pub const FRUITS_DDL: &str = "CREATE TABLE Fruits (
    FruitId INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL,
    Family TEXT NOT NULL,
    Calories INTEGER NOT NULL,
    Genus TEXT,
    NutritionId INTEGER REFERENCES Nutritions(NutritionId),
    Version INTEGER NOT NULL DEFAULT 1,
    IsDeleted INTEGER NOT NULL DEFAULT 0,
    DeletedDate TEXT,
    DeletedBy TEXT,
    EnteredBy TEXT NOT NULL,
    EnteredDate TEXT NOT NULL,
    UpdatedBy TEXT,
    UpdatedDate TEXT
)";

#[derive(Debug, Clone)]
pub struct Fruit {
    pub state: EntityState<i64>,
    pub name: String,
    pub family: String,
    pub calories: i64,
    /// Lazily loaded scalar; `None` until explicitly initialized.
    pub genus: Option<String>,
    /// Lazy reference; `None` until explicitly initialized.
    pub nutrition: Option<Lazy<i64, Nutrition>>,
}

impl Fruit {
    pub fn new(name: &str, family: &str, calories: i64) -> Self {
        Self {
            state: EntityState::default(),
            name: name.to_string(),
            family: family.to_string(),
            calories,
            genus: Some(format!("{name} genus")),
            nutrition: None,
        }
    }
}

impl Entity for Fruit {
    type Key = i64;

    fn state(&self) -> &EntityState<i64> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState<i64> {
        &mut self.state
    }

    fn data_values(&self) -> Vec<(&'static str, Value)> {
        let mut values = vec![
            ("Name", Value::Text(self.name.clone())),
            ("Family", Value::Text(self.family.clone())),
            ("Calories", Value::Integer(self.calories)),
        ];
        if let Some(genus) = &self.genus {
            values.push(("Genus", Value::Text(genus.clone())));
        }
        if let Some(nutrition) = &self.nutrition {
            let key = match nutrition {
                Lazy::Unloaded(key) => Some(*key),
                Lazy::Loaded(loaded) => loaded.state.id,
            };
            if let Some(key) = key {
                values.push(("Nutrition", Value::Integer(key)));
            }
        }
        values
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let mut state: EntityState<i64> = EntityState::default();
        state.id = Some(row.get("_id")?);
        state.version = Some(row.get("_version")?);
        let is_deleted: i64 = row.get("_is_deleted")?;
        if is_deleted != 0 {
            state.soft_delete = Some(SoftDeleteStamp {
                deleted_date: row.get("_deleted_date")?,
                deleted_by: row.get("_deleted_by")?,
            });
        }
        state.audit = Some(AuditStamp {
            created_by: row.get("_created_by")?,
            created_date: row.get("_created_date")?,
            last_updated_by: row.get("_updated_by")?,
            last_updated_date: row.get("_updated_date")?,
        });
        Ok(Self {
            state,
            name: row.get("Name")?,
            family: row.get("Family")?,
            calories: row.get("Calories")?,
            genus: None,
            nutrition: None,
        })
    }

    fn unset_properties(&self) -> Vec<&'static str> {
        let mut unset = Vec::new();
        if self.genus.is_none() {
            unset.push("Genus");
        }
        if self.nutrition.is_none() {
            unset.push("Nutrition");
        }
        unset
    }

    fn apply_property(&mut self, name: &str, value: PropertyValue) -> bool {
        match (name, value) {
            ("Genus", PropertyValue::Scalar(Value::Text(text))) => {
                self.genus = Some(text);
                true
            }
            ("Genus", PropertyValue::Scalar(Value::Null)) => true,
            ("Nutrition", PropertyValue::Reference(Value::Integer(key))) => {
                self.nutrition = Some(Lazy::Unloaded(key));
                true
            }
            ("Nutrition", PropertyValue::Reference(Value::Null)) => true,
            _ => false,
        }
    }
}

/// Capability-free entity: no version, no soft delete, no audit columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Nutrition {
    pub state: EntityState<i64>,
    pub sugar: f64,
    pub carbohydrates: f64,
}

impl Nutrition {
    pub fn new(sugar: f64, carbohydrates: f64) -> Self {
        Self {
            state: EntityState::default(),
            sugar,
            carbohydrates,
        }
    }
}

impl Entity for Nutrition {
    type Key = i64;

    fn state(&self) -> &EntityState<i64> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState<i64> {
        &mut self.state
    }

    fn data_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Sugar", Value::Real(self.sugar)),
            ("Carbohydrates", Value::Real(self.carbohydrates)),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let mut state: EntityState<i64> = EntityState::default();
        state.id = Some(row.get("_id")?);
        Ok(Self {
            state,
            sugar: row.get("Sugar")?,
            carbohydrates: row.get("Carbohydrates")?,
        })
    }
}

pub fn fruit_mapping() -> Arc<EntityMapping> {
    let mapping = EntityMapping::builder("Fruit", "Fruits", "Id", "FruitId")
        .capabilities(Capabilities::all())
        .lazy_references()
        .property("Name", "Name")
        .property("Family", "Family")
        .property("Calories", "Calories")
        .property("Genus", "Genus")
        .reference("Nutrition", "NutritionId", "Nutrition")
        .build()
        .unwrap();
    Arc::new(mapping)
}

/// Same shape as [`fruit_mapping`] but without declared lazy references.
pub fn eager_fruit_mapping() -> Arc<EntityMapping> {
    let mapping = EntityMapping::builder("Fruit", "Fruits", "Id", "FruitId")
        .capabilities(Capabilities::all())
        .property("Name", "Name")
        .property("Family", "Family")
        .property("Calories", "Calories")
        .property("Genus", "Genus")
        .reference("Nutrition", "NutritionId", "Nutrition")
        .build()
        .unwrap();
    Arc::new(mapping)
}

pub fn nutrition_mapping() -> Arc<EntityMapping> {
    let mapping = EntityMapping::builder("Nutrition", "Nutritions", "Id", "NutritionId")
        .capabilities(Capabilities::none())
        .property("Sugar", "Sugar")
        .property("Carbohydrates", "Carbohydrates")
        .build()
        .unwrap();
    Arc::new(mapping)
}

/// Fresh factory over a private in-memory database with the catalog schema
/// applied. `configure` runs before the first session opens, so tests can
/// register filters or adjust config.
pub fn fresh_factory_with(
    config: SessionFactoryConfig,
    configure: impl FnOnce(&mut SessionFactory),
) -> Arc<SessionFactory> {
    let mut factory = SessionFactory::in_memory(config).unwrap();
    configure(&mut factory);
    let factory = Arc::new(factory);

    let session = factory.open_session().unwrap();
    for ddl in [NUTRITIONS_DDL, FRUITS_DDL] {
        Query::new(ddl).execute_update(&session).unwrap();
    }
    session.close();
    factory
}

pub fn fresh_factory() -> Arc<SessionFactory> {
    fresh_factory_with(SessionFactoryConfig::default(), |_| {})
}
