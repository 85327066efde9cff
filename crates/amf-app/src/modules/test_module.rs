//! `TestModule`: arithmetic over JSON numbers.

use std::sync::atomic::{AtomicU64, Ordering};

use amf_runtime::{Call, MethodTable, Module, ModuleContext, ModuleError, ModuleInfo, ModuleType};
use async_trait::async_trait;
use serde_json::{Number, Value};
use tracing::info;

/// Process-wide adder.
#[derive(Debug, Default)]
pub struct TestModule {
    calls: AtomicU64,
}

impl TestModule {
    /// Sum two JSON numbers. Integers stay integers while they fit.
    pub fn add(&self, a: &Value, b: &Value) -> Result<Value, ModuleError> {
        let _ = self.calls.fetch_add(1, Ordering::Relaxed);
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            if let Some(sum) = x.checked_add(y) {
                return Ok(Value::from(sum));
            }
        }
        let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
            return Err(ModuleError::execution(format!("cannot add {a} and {b}")));
        };
        Number::from_f64(x + y)
            .map(Value::Number)
            .ok_or_else(|| ModuleError::execution("sum is not a finite number"))
    }

    /// How many additions this instance has performed.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Module for TestModule {
    async fn on_create_module(&self) -> Result<(), ModuleError> {
        info!("TestModule ready");
        Ok(())
    }

    async fn on_destroy_module(&self) -> Result<(), ModuleError> {
        info!(calls = self.calls(), "TestModule stopped");
        Ok(())
    }
}

impl ModuleType for TestModule {
    const NAME: &'static str = "TestModule";

    fn info() -> ModuleInfo {
        ModuleInfo {
            version: 1,
            author: "amf".into(),
            description: "Adds numbers".into(),
        }
    }

    fn create(_ctx: &ModuleContext) -> Result<Self, ModuleError> {
        Ok(Self::default())
    }

    fn methods(table: &mut MethodTable<Self>) {
        let _ = table.register("add", 2, |this, call: Call| async move {
            this.add(&call.arg::<Value>(0)?, &call.arg::<Value>(1)?)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn integers_stay_integers() {
        let m = TestModule::default();
        assert_eq!(m.add(&json!(1), &json!(2)).unwrap(), json!(3));
        assert_eq!(m.calls(), 1);
    }

    #[test]
    fn floats_and_overflow_fall_back_to_f64() {
        let m = TestModule::default();
        assert_eq!(m.add(&json!(0.5), &json!(1)).unwrap(), json!(1.5));
        let big = m.add(&json!(i64::MAX), &json!(1)).unwrap();
        assert!(big.as_f64().unwrap() > 9.2e18);
    }

    #[tokio::test]
    async fn remote_add_reports_missing_arguments() {
        use std::sync::Arc;

        use amf_runtime::{ModuleCatalog, ModuleHost, ModuleRegistry, SessionContext, SessionEnv, SessionHooks, SessionTtls};
        use amf_settings::AmfSettings;
        use amf_store::SqliteSessionStore;

        let mut catalog = ModuleCatalog::new();
        let _ = catalog.register::<TestModule>().unwrap();
        let host = ModuleHost::new(
            Arc::new(ModuleRegistry::from_catalog(&catalog).unwrap()),
            Arc::new(AmfSettings::default()),
            Arc::new(SqliteSessionStore::in_memory().unwrap()),
        );
        host.boot().await.unwrap();
        let env = SessionEnv::new(&host, SessionHooks::new(), SessionTtls::default());
        let session = SessionContext::init(&env, None, None, None).await.unwrap();

        let add = host.registry().get("TestModule").unwrap().method("add").unwrap().clone();
        let instance = host.context().singleton("TestModule").unwrap();
        let short = Call {
            session: session.clone(),
            params: vec![json!(1)],
        };
        assert_matches!(
            add.invoke(instance.clone(), short).await,
            Err(ModuleError::Argument { index: 1, .. })
        );
        let full = Call {
            session,
            params: vec![json!(1), json!(2)],
        };
        assert_eq!(add.invoke(instance, full).await.unwrap(), json!(3));
        host.shutdown().await;
    }

    #[test]
    fn non_numbers_are_rejected() {
        let m = TestModule::default();
        assert_matches!(
            m.add(&json!("1"), &json!(2)),
            Err(ModuleError::Execution(_))
        );
    }
}
