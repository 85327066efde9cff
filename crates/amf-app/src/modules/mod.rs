//! Bundled sample modules.
//!
//! | module       | lifecycle  | depends on   | remote methods                  |
//! |--------------|------------|--------------|---------------------------------|
//! | `TestModule` | singleton  |              | `add(a, b)`                     |
//! | `Counter`    | perSession |              | `increment()`, `get()`, `reset()` |
//! | `Greeter`    | singleton  | `TestModule` | `hello(name)`, `uploadSize()`, `sum(values)` |

pub mod counter;
pub mod greeter;
pub mod test_module;

use amf_runtime::{ModuleCatalog, ModuleError, RegistryError, SessionContext, SessionHooks};
use serde_json::json;

pub use counter::Counter;
pub use greeter::Greeter;
pub use test_module::TestModule;

/// Browser-wide item counting requests.
pub const VISITS_ITEM: &str = "visits";

/// Every bundled module type.
pub fn catalog() -> Result<ModuleCatalog, RegistryError> {
    let mut catalog = ModuleCatalog::new();
    let _ = catalog
        .register::<TestModule>()?
        .register::<Counter>()?
        .register::<Greeter>()?;
    Ok(catalog)
}

/// Hooks run at the start of every session.
pub fn session_hooks() -> SessionHooks {
    let mut hooks = SessionHooks::new();
    let _ = hooks.register("visits", |session: SessionContext| async move {
        let visits = session
            .global_item_or(VISITS_ITEM, json!(0))
            .as_u64()
            .unwrap_or(0);
        session.set_global_item(VISITS_ITEM, visits + 1);
        Ok::<_, ModuleError>(())
    });
    hooks
}
