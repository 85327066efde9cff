//! `Counter`: a per-session counter kept in the tab's items.

use std::sync::atomic::{AtomicU64, Ordering};

use amf_runtime::{
    Call, Lifecycle, MethodTable, Module, ModuleContext, ModuleError, ModuleType, SessionContext,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Tab item holding the count.
pub const COUNTER_ITEM: &str = "counter";

/// Counts calls per tab. Each session gets its own instance; the count
/// itself lives in the session items so it survives between requests.
#[derive(Debug, Default)]
pub struct Counter {
    touched: AtomicU64,
}

impl Counter {
    /// Increment the tab's count and return it.
    pub fn increment(&self, session: &SessionContext) -> u64 {
        let _ = self.touched.fetch_add(1, Ordering::Relaxed);
        let next = Self::get(session) + 1;
        session.set_session_item(COUNTER_ITEM, next);
        next
    }

    /// The tab's count.
    pub fn get(session: &SessionContext) -> u64 {
        session
            .session_item_or(COUNTER_ITEM, json!(0))
            .as_u64()
            .unwrap_or(0)
    }

    /// Clear the tab's count.
    pub fn reset(&self, session: &SessionContext) -> u64 {
        let _ = self.touched.fetch_add(1, Ordering::Relaxed);
        let _ = session.remove_session_item(COUNTER_ITEM);
        0
    }

    /// Mutating calls handled by this instance.
    pub fn touched(&self) -> u64 {
        self.touched.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Module for Counter {
    async fn on_start_session(&self, session: &SessionContext) -> Result<(), ModuleError> {
        debug!(tab = %session.tab_id(), count = Self::get(session), "counter bound");
        Ok(())
    }

    async fn on_end_session(&self, session: &SessionContext) -> Result<(), ModuleError> {
        debug!(tab = %session.tab_id(), touched = self.touched(), "counter released");
        Ok(())
    }
}

impl ModuleType for Counter {
    const NAME: &'static str = "Counter";

    fn lifecycle() -> Lifecycle {
        Lifecycle::PerSession
    }

    fn create(_ctx: &ModuleContext) -> Result<Self, ModuleError> {
        Ok(Self::default())
    }

    fn methods(table: &mut MethodTable<Self>) {
        let _ = table
            .register("increment", 0, |this, call: Call| async move {
                Ok::<_, ModuleError>(this.increment(&call.session))
            })
            .register("get", 0, |_this, call: Call| async move {
                Ok::<_, ModuleError>(Counter::get(&call.session))
            })
            .register("reset", 0, |this, call: Call| async move {
                Ok::<_, ModuleError>(this.reset(&call.session))
            });
    }
}
