use crate::{
    error::ModelError,
    model::{EntityTypeId, ForeignKeyId, Model, PropertyId},
    relationship::{DeleteBehavior, ForeignKeyData, NavigationChange},
    source::ConfigurationSource,
};

///
/// RelationshipBuilder
///
/// Fluent handle over one relationship. Every step returns the handle for
/// the relationship that survived the change (merges may replace it) or
/// `None` once a proposal is rejected.
///

pub struct RelationshipBuilder<'a> {
    model: &'a mut Model,
    fk: ForeignKeyId,
}

impl<'a> RelationshipBuilder<'a> {
    pub(crate) const fn new(model: &'a mut Model, fk: ForeignKeyId) -> Self {
        Self { model, fk }
    }

    #[must_use]
    pub const fn id(&self) -> ForeignKeyId {
        self.fk
    }

    /// Current state; `Detached` once the relationship left the model.
    pub fn data(&self) -> Result<&ForeignKeyData, ModelError> {
        self.model.foreign_key(self.fk)
    }

    pub fn model(&self) -> &Model {
        &*self.model
    }

    fn follow(self, configured: Option<ForeignKeyId>) -> Option<Self> {
        configured.map(|fk| Self {
            model: self.model,
            fk,
        })
    }

    pub fn navigations(
        self,
        to_principal: NavigationChange,
        to_dependent: NavigationChange,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self
            .model
            .set_navigations(self.fk, to_principal, to_dependent, source)?;

        Ok(self.follow(configured))
    }

    pub fn foreign_key_properties(
        self,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self
            .model
            .set_foreign_key_properties(self.fk, properties, source)?;

        Ok(self.follow(configured))
    }

    pub fn principal_key(
        self,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self.model.set_principal_key(self.fk, properties, source)?;

        Ok(self.follow(configured))
    }

    pub fn related_types(
        self,
        principal: EntityTypeId,
        dependent: EntityTypeId,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self
            .model
            .set_related_types(self.fk, principal, dependent, source)?;

        Ok(self.follow(configured))
    }

    pub fn invert(self, source: ConfigurationSource) -> Result<Option<Self>, ModelError> {
        let configured = self.model.invert_relationship(self.fk, source)?;

        Ok(self.follow(configured))
    }

    pub fn unique(self, unique: bool, source: ConfigurationSource) -> Result<Option<Self>, ModelError> {
        let configured = self.model.set_unique(self.fk, unique, source)?;

        Ok(self.follow(configured))
    }

    pub fn required(
        self,
        required: bool,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self.model.set_required(self.fk, required, source)?;

        Ok(self.follow(configured))
    }

    pub fn ownership(
        self,
        ownership: bool,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self.model.set_ownership(self.fk, ownership, source)?;

        Ok(self.follow(configured))
    }

    pub fn delete_behavior(
        self,
        behavior: DeleteBehavior,
        source: ConfigurationSource,
    ) -> Result<Option<Self>, ModelError> {
        let configured = self.model.set_delete_behavior(self.fk, behavior, source)?;

        Ok(self.follow(configured))
    }

    /// Remove the relationship; `false` when `source` cannot override it.
    pub fn remove(self, source: ConfigurationSource) -> Result<bool, ModelError> {
        self.model.remove_foreign_key(self.fk, source)
    }
}
