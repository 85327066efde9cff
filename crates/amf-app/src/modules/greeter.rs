//! `Greeter`: greetings, upload sizes, and sums through `TestModule`.

use std::sync::Arc;

use amf_runtime::{Call, MethodTable, Module, ModuleContext, ModuleError, ModuleType};
use serde_json::Value;

use super::TestModule;

/// Depends on [`TestModule`], which is therefore always initialized first.
#[derive(Debug)]
pub struct Greeter {
    adder: Arc<TestModule>,
}

impl Greeter {
    /// `"Hello, <name>!"`.
    pub fn hello(name: &str) -> String {
        format!("Hello, {name}!")
    }

    /// Sum `values` with the adder.
    pub fn sum(&self, values: &[Value]) -> Result<Value, ModuleError> {
        values
            .iter()
            .try_fold(Value::from(0), |acc, v| self.adder.add(&acc, v))
    }
}

impl Module for Greeter {}

impl ModuleType for Greeter {
    const NAME: &'static str = "Greeter";

    fn dependencies() -> &'static [&'static str] {
        &[TestModule::NAME]
    }

    fn create(ctx: &ModuleContext) -> Result<Self, ModuleError> {
        let adder = ctx
            .module::<TestModule>()
            .ok_or_else(|| ModuleError::Unavailable("TestModule is not running".into()))?;
        Ok(Self { adder })
    }

    fn methods(table: &mut MethodTable<Self>) {
        let _ = table
            .register("hello", 1, |_this, call: Call| async move {
                let name: String = call.arg(0)?;
                Ok::<_, ModuleError>(Greeter::hello(&name))
            })
            .register("uploadSize", 0, |_this, call: Call| async move {
                Ok::<_, ModuleError>(call.session.upload().map_or(0, |body| body.len()))
            })
            .register("sum", 1, |this, call: Call| async move {
                let values: Vec<Value> = call.arg(0)?;
                this.sum(&values)
            });
    }
}
