use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, KeyId, Model, PropertyId},
    source::ConfigurationSource,
};
use tracing::{debug, trace};

///
/// KeyChange
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum KeyChange {
    Keep,
    /// Fall back to the principal's primary key; the source is forgotten.
    Primary,
    Existing(KeyId, Option<ConfigurationSource>),
    Create(Vec<PropertyId>),
}

///
/// PropertiesChange
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum PropertiesChange {
    Keep,
    /// Replace with convention shadow properties matching the principal key.
    Implicit,
    Explicit(Vec<PropertyId>),
}

///
/// KeysPlan
///

#[derive(Clone, Debug)]
struct KeysPlan {
    properties: PropertiesChange,
    principal_key: KeyChange,
    /// Properties that must become non-nullable for a required relationship.
    non_nullable: Vec<PropertyId>,
}

impl KeysPlan {
    const fn keep() -> Self {
        Self {
            properties: PropertiesChange::Keep,
            principal_key: KeyChange::Keep,
            non_nullable: Vec::new(),
        }
    }

    fn is_noop(&self) -> bool {
        self.properties == PropertiesChange::Keep && self.principal_key == KeyChange::Keep
    }
}

impl Model {
    /// Replace the foreign key properties of `fk`; `None` asks for implicit
    /// shadow properties.
    ///
    /// When the new properties cannot reference the current principal key, a
    /// compatible key on the principal is used instead, provided `source`
    /// can override the principal key. The result may be merged into an
    /// existing relationship of the same shape, whose id is returned.
    pub fn set_foreign_key_properties(
        &mut self,
        fk: ForeignKeyId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_foreign_key_properties(fk, properties, source)? else {
            return Ok(None);
        };

        self.apply_keys_plan(fk, plan, source, KeyAspect::Properties)
    }

    /// Pure twin of `set_foreign_key_properties`.
    pub fn can_set_foreign_key_properties(
        &self,
        fk: ForeignKeyId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self
            .plan_foreign_key_properties(fk, properties, source)?
            .is_some())
    }

    /// Point `fk` at the key over `properties` on the principal's root;
    /// `None` falls back to the primary key.
    pub fn set_principal_key(
        &mut self,
        fk: ForeignKeyId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        let Some(plan) = self.plan_principal_key(fk, properties, source)? else {
            return Ok(None);
        };

        self.apply_keys_plan(fk, plan, source, KeyAspect::PrincipalKey)
    }

    /// Pure twin of `set_principal_key`.
    pub fn can_set_principal_key(
        &self,
        fk: ForeignKeyId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        Ok(self.plan_principal_key(fk, properties, source)?.is_some())
    }

    fn plan_foreign_key_properties(
        &self,
        fk: ForeignKeyId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<KeysPlan>, ModelError> {
        let data = self.foreign_key(fk)?;

        let Some(properties) = properties else {
            if data.properties_source.is_none() {
                return Ok(Some(KeysPlan::keep()));
            }
            if !source.overrides(data.properties_source) {
                trace!(fk = %fk, ?source, "implicit foreign key properties rejected");
                return Ok(None);
            }
            let mut plan = KeysPlan::keep();
            plan.properties = PropertiesChange::Implicit;
            return Ok(Some(plan));
        };

        self.validate_property_list("a foreign key", data.dependent, properties)?;
        if data.properties.as_slice() == properties {
            return Ok(Some(KeysPlan::keep()));
        }
        if !source.overrides(data.properties_source) {
            trace!(fk = %fk, ?source, "foreign key properties rejected");
            return Ok(None);
        }

        let mut plan = KeysPlan::keep();
        plan.properties = PropertiesChange::Explicit(properties.to_vec());

        // Phase 1: the principal key must accept the new properties.
        if !self.properties_compatible(properties, data.principal_key) {
            let candidate = source
                .overrides(data.principal_key_source)
                .then(|| self.compatible_principal_key(data.principal, properties))
                .flatten();
            let Some(key) = candidate else {
                return self.incompatible(fk, properties, data.principal_key, source);
            };
            plan.principal_key = if Some(key) == self.find_primary_key(data.principal) {
                KeyChange::Primary
            } else {
                KeyChange::Existing(key, None)
            };
        }

        // Phase 2: a required relationship needs non-nullable properties.
        if data.is_required() {
            for property in properties {
                let property_data = self.property(*property)?;
                if !property_data.is_nullable() {
                    continue;
                }
                if !property_data.nullable.can_set(&false, source) {
                    trace!(fk = %fk, property = %property, "required relationship needs a nullable property");
                    return Ok(None);
                }
                plan.non_nullable.push(*property);
            }
        }

        Ok(Some(plan))
    }

    fn plan_principal_key(
        &self,
        fk: ForeignKeyId,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<KeysPlan>, ModelError> {
        let data = self.foreign_key(fk)?;
        let root = self.root_of(data.principal);

        let (change, kinds) = match properties {
            None => {
                if data.principal_key_source.is_none()
                    && self.find_primary_key(root) == Some(data.principal_key)
                {
                    return Ok(Some(KeysPlan::keep()));
                }
                (KeyChange::Primary, self.primary_key_kinds(root))
            }
            Some(properties) => {
                self.validate_property_list("a principal key", root, properties)?;
                let existing = self.find_key(root, properties);
                if existing == Some(data.principal_key) {
                    return Ok(Some(KeysPlan::keep()));
                }
                let change = match existing {
                    Some(key) => KeyChange::Existing(key, Some(source)),
                    None => {
                        if !self.can_add_key(root, properties, source)? {
                            return Ok(None);
                        }
                        KeyChange::Create(properties.to_vec())
                    }
                };
                (change, self.property_kinds(properties))
            }
        };
        if !source.overrides(data.principal_key_source) {
            trace!(fk = %fk, ?source, "principal key change rejected");
            return Ok(None);
        }

        let mut plan = KeysPlan::keep();
        plan.principal_key = change;

        // Phase 1: incompatible properties are rediscovered if allowed.
        if self.property_kinds(&data.properties) != kinds {
            if !source.overrides(data.properties_source) {
                let key = match &plan.principal_key {
                    KeyChange::Existing(key, _) => *key,
                    _ => data.principal_key,
                };
                return self.incompatible(fk, &data.properties, key, source);
            }
            plan.properties = PropertiesChange::Implicit;
        }

        Ok(Some(plan))
    }

    fn incompatible(
        &self,
        fk: ForeignKeyId,
        properties: &[PropertyId],
        key: KeyId,
        source: ConfigurationSource,
    ) -> Result<Option<KeysPlan>, ModelError> {
        trace!(fk = %fk, ?source, "foreign key and principal key are incompatible");
        if !source.is_explicit() {
            return Ok(None);
        }

        let data = self.foreign_key(fk)?;
        let key_properties = self
            .key(key)
            .map(|k| k.properties.clone())
            .unwrap_or_default();

        Err(ModelError::IncompatibleForeignKey {
            dependent: self.entity_name(data.dependent),
            properties: self.property_list_label(properties),
            principal: self.entity_name(data.principal),
            key: self.property_list_label(&key_properties),
        })
    }

    /// Primary key first, then alternate keys, whose value kinds match `properties`.
    pub(crate) fn compatible_principal_key(
        &self,
        principal: EntityTypeId,
        properties: &[PropertyId],
    ) -> Option<KeyId> {
        let kinds = self.property_kinds(properties);
        let primary = self.find_primary_key(principal);

        primary
            .into_iter()
            .chain(self.keys_of(self.root_of(principal)))
            .find(|key| self.key_kinds(*key) == kinds)
    }

    fn apply_keys_plan(
        &mut self,
        fk: ForeignKeyId,
        plan: KeysPlan,
        source: ConfigurationSource,
        aspect: KeyAspect,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        if plan.is_noop() {
            let data = self.foreign_key_mut(fk)?;
            match aspect {
                KeyAspect::Properties if data.properties_source.is_some() => {
                    data.properties_source = Some(source.max(data.properties_source));
                }
                KeyAspect::PrincipalKey if data.principal_key_source.is_some() => {
                    data.principal_key_source = Some(source.max(data.principal_key_source));
                }
                _ => {}
            }
            data.upgrade_source(source);
            return Ok(Some(fk));
        }

        self.run_batch(|model| {
            let previous = model.foreign_key(fk)?.clone();

            // Phase 1: principal key.
            let (key, key_source) = match plan.principal_key {
                KeyChange::Keep => (previous.principal_key, previous.principal_key_source),
                KeyChange::Primary => {
                    let key = model
                        .get_or_create_primary_key(previous.principal)?
                        .ok_or_else(|| ModelError::InvalidRelatedTypes {
                            entity: model.entity_name(previous.dependent),
                            other: model.entity_name(previous.principal),
                            reason: "the principal type is keyless".to_string(),
                        })?;
                    (key, None)
                }
                KeyChange::Existing(key, key_source) => (key, key_source),
                KeyChange::Create(properties) => {
                    let root = model.root_of(previous.principal);
                    let key = model.add_key(root, &properties, source)?.ok_or_else(|| {
                        ModelError::InvalidRelatedTypes {
                            entity: model.entity_name(previous.dependent),
                            other: model.entity_name(previous.principal),
                            reason: "the principal key could not be created".to_string(),
                        }
                    })?;
                    (key, Some(source))
                }
            };
            let data = model.foreign_key_mut(fk)?;
            data.principal_key = key;
            data.principal_key_source = key_source;

            // Phase 2: properties.
            match plan.properties {
                PropertiesChange::Keep => {}
                PropertiesChange::Implicit => model.reset_implicit_properties(fk)?,
                PropertiesChange::Explicit(properties) => {
                    let data = model.foreign_key_mut(fk)?;
                    data.properties = properties;
                    data.properties_source = Some(source);
                }
            }
            for property in plan.non_nullable {
                model.apply_property_nullable(property, false, source)?;
            }

            model.foreign_key_mut(fk)?.upgrade_source(source);
            debug!(fk = %fk, ?source, "foreign key properties changed");
            model.notify(ModelEvent::ForeignKeyPropertiesChanged {
                fk,
                previous_properties: previous.properties.clone(),
                previous_principal_key: previous.principal_key,
            });

            model.remove_unused_shadow_properties(&previous.properties)?;
            model.remove_unused_convention_keys(&[previous.principal_key])?;

            // Phase 3: two relationships may now describe the same shape.
            match model.find_duplicate(fk) {
                Some(existing) => {
                    model.merge_into(fk, existing, source)?;
                    Ok(Some(existing))
                }
                None => Ok(Some(fk)),
            }
        })
    }

    /// Replace the properties of `fk` with fresh shadow properties.
    pub(crate) fn reset_implicit_properties(&mut self, fk: ForeignKeyId) -> Result<(), ModelError> {
        let previous = std::mem::take(&mut self.foreign_key_mut(fk)?.properties);
        self.remove_unused_shadow_properties(&previous)?;

        let data = self.foreign_key(fk)?;
        let (dependent, principal, key) = (data.dependent, data.principal, data.principal_key);
        let navigation = data.to_principal.as_ref().map(|nav| nav.name.clone());
        let nullable = !data.is_required();

        let properties =
            self.create_implicit_properties(dependent, principal, key, navigation.as_deref(), nullable)?;
        let data = self.foreign_key_mut(fk)?;
        data.properties = properties;
        data.properties_source = None;

        Ok(())
    }

    /// Shadow properties on `dependent` mirroring `key`, named after the
    /// navigation to the principal or, lacking one, the principal type.
    pub(crate) fn create_implicit_properties(
        &mut self,
        dependent: EntityTypeId,
        principal: EntityTypeId,
        key: KeyId,
        navigation: Option<&str>,
        nullable: bool,
    ) -> Result<Vec<PropertyId>, ModelError> {
        let base = navigation.map_or_else(|| self.entity_name(principal), ToString::to_string);
        let key_properties = self.key(key)?.properties.clone();

        let mut created = Vec::with_capacity(key_properties.len());
        for key_property in key_properties {
            let data = self.property(key_property)?;
            let name = if data.name.starts_with(&base) {
                data.name.clone()
            } else {
                format!("{base}{}", data.name)
            };
            let kind = data.kind;
            created.push(self.create_shadow_property(dependent, &name, kind, nullable)?);
        }

        Ok(created)
    }
}

///
/// KeyAspect
///

#[derive(Clone, Copy, Debug)]
enum KeyAspect {
    Properties,
    PrincipalKey,
}
