use crate::{
    batch::ModelEvent,
    error::ModelError,
    model::{ForeignKeyId, Model},
};

///
/// ModelObserver
///
/// Reacts to committed changes once the outermost batch closes. The
/// observer may call back into the model; changes it makes are queued and
/// delivered to it in order before the outer call returns.
///
/// Returning `Some(id)` for a relationship event tells the engine that the
/// relationship now lives under `id`; callers still holding the old id are
/// redirected to it.
///

pub trait ModelObserver {
    fn on_event(
        &mut self,
        model: &mut Model,
        event: &ModelEvent,
    ) -> Result<Option<ForeignKeyId>, ModelError>;
}

///
/// EventLog
/// Records every delivered event; handy for hosts that replay them later.
///

#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: std::rc::Rc<std::cell::RefCell<Vec<ModelEvent>>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ModelEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl ModelObserver for EventLog {
    fn on_event(
        &mut self,
        _: &mut Model,
        event: &ModelEvent,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        self.events.borrow_mut().push(event.clone());
        Ok(None)
    }
}
