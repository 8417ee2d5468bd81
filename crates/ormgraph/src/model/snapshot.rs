use crate::{
    model::{EntityTypeId, KeyId, Model, PropertyId},
    relationship::{DeleteBehavior, ForeignKeyData},
    source::ConfigurationSource,
    types::ValueKind,
};
use serde::{Deserialize, Serialize};

///
/// ModelSnapshot
///
/// Name-based, id-free view of the whole graph. Two models built through
/// different call sequences compare equal when they describe the same schema.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub entity_types: Vec<EntityTypeSnapshot>,
    pub foreign_keys: Vec<ForeignKeySnapshot>,
}

///
/// EntityTypeSnapshot
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntityTypeSnapshot {
    pub name: String,
    pub base_type: Option<String>,
    pub source: ConfigurationSource,
    pub is_keyless: bool,
    pub is_owned: bool,
    pub properties: Vec<PropertySnapshot>,
    pub primary_key: Option<Vec<String>>,
    pub keys: Vec<KeySnapshot>,
    pub indexes: Vec<IndexSnapshot>,
    pub service_properties: Vec<String>,
    pub triggers: Vec<String>,
}

///
/// PropertySnapshot
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PropertySnapshot {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub is_shadow: bool,
    pub source: ConfigurationSource,
}

///
/// KeySnapshot
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeySnapshot {
    pub properties: Vec<String>,
    pub source: ConfigurationSource,
}

///
/// IndexSnapshot
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexSnapshot {
    pub name: Option<String>,
    pub properties: Vec<String>,
    pub unique: bool,
    pub source: ConfigurationSource,
}

///
/// ForeignKeySnapshot
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ForeignKeySnapshot {
    pub dependent: String,
    pub principal: String,
    pub properties: Vec<String>,
    pub principal_key: Vec<String>,
    pub to_principal: Option<String>,
    pub to_dependent: Option<String>,
    pub unique: bool,
    pub required: bool,
    pub ownership: bool,
    pub delete_behavior: DeleteBehavior,
    pub source: ConfigurationSource,
}

impl ModelSnapshot {
    #[must_use]
    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeSnapshot> {
        self.entity_types.iter().find(|entity| entity.name == name)
    }

    /// Relationships declared with `dependent` as their dependent type.
    pub fn foreign_keys_of<'a>(
        &'a self,
        dependent: &'a str,
    ) -> impl Iterator<Item = &'a ForeignKeySnapshot> + 'a {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.dependent == dependent)
    }
}

impl EntityTypeSnapshot {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertySnapshot> {
        self.properties.iter().find(|property| property.name == name)
    }
}

impl Model {
    /// Capture the current graph.
    #[must_use]
    pub fn snapshot(&self) -> ModelSnapshot {
        let mut entity_types = self
            .entity_types()
            .map(|(id, _)| self.entity_type_snapshot(id))
            .collect::<Vec<_>>();
        entity_types.sort_by(|a, b| a.name.cmp(&b.name));

        let mut foreign_keys = self
            .foreign_keys()
            .map(|(_, fk)| self.foreign_key_snapshot(fk))
            .collect::<Vec<_>>();
        foreign_keys.sort_by(|a, b| {
            (&a.dependent, &a.properties, &a.principal, &a.principal_key).cmp(&(
                &b.dependent,
                &b.properties,
                &b.principal,
                &b.principal_key,
            ))
        });

        ModelSnapshot {
            entity_types,
            foreign_keys,
        }
    }

    fn entity_type_snapshot(&self, id: EntityTypeId) -> EntityTypeSnapshot {
        let Ok(data) = self.entity_type(id) else {
            return EntityTypeSnapshot {
                name: id.to_string(),
                base_type: None,
                source: ConfigurationSource::Convention,
                is_keyless: false,
                is_owned: false,
                properties: Vec::new(),
                primary_key: None,
                keys: Vec::new(),
                indexes: Vec::new(),
                service_properties: Vec::new(),
                triggers: Vec::new(),
            };
        };

        let properties = data
            .properties
            .values()
            .filter_map(|property| self.property(*property).ok())
            .map(|property| PropertySnapshot {
                name: property.name.clone(),
                kind: property.kind,
                nullable: property.is_nullable(),
                is_shadow: property.is_shadow,
                source: property.source,
            })
            .collect();

        let mut keys = data
            .keys
            .iter()
            .filter_map(|key| self.key(*key).ok())
            .map(|key| KeySnapshot {
                properties: self.property_names(&key.properties),
                source: key.source,
            })
            .collect::<Vec<_>>();
        keys.sort_by(|a, b| a.properties.cmp(&b.properties));

        let mut indexes = data
            .indexes
            .iter()
            .filter_map(|index| self.index(*index).ok())
            .map(|index| IndexSnapshot {
                name: index.name.clone(),
                properties: self.property_names(&index.properties),
                unique: index.is_unique(),
                source: index.source,
            })
            .collect::<Vec<_>>();
        indexes.sort_by(|a, b| (&a.name, &a.properties).cmp(&(&b.name, &b.properties)));

        EntityTypeSnapshot {
            name: data.name.clone(),
            base_type: data.base_type.map(|base| self.entity_name(base)),
            source: data.source,
            is_keyless: data.is_keyless(),
            is_owned: data.is_owned,
            properties,
            primary_key: data.primary_key.map(|key| self.key_property_names(key)),
            keys,
            indexes,
            service_properties: data.service_properties.keys().cloned().collect(),
            triggers: data.triggers.keys().cloned().collect(),
        }
    }

    fn foreign_key_snapshot(&self, fk: &ForeignKeyData) -> ForeignKeySnapshot {
        ForeignKeySnapshot {
            dependent: self.entity_name(fk.dependent),
            principal: self.entity_name(fk.principal),
            properties: self.property_names(&fk.properties),
            principal_key: self.key_property_names(fk.principal_key),
            to_principal: fk.to_principal.as_ref().map(|nav| nav.name.clone()),
            to_dependent: fk.to_dependent.as_ref().map(|nav| nav.name.clone()),
            unique: fk.is_unique(),
            required: fk.is_required(),
            ownership: fk.is_ownership(),
            delete_behavior: fk.delete_behavior(),
            source: fk.source,
        }
    }

    fn property_names(&self, properties: &[PropertyId]) -> Vec<String> {
        properties
            .iter()
            .map(|id| {
                self.property(*id)
                    .map_or_else(|_| id.to_string(), |data| data.name.clone())
            })
            .collect()
    }

    fn key_property_names(&self, key: KeyId) -> Vec<String> {
        self.key(key)
            .map(|data| self.property_names(&data.properties))
            .unwrap_or_default()
    }
}
