//! `?cmd=` handlers served next to `exec` and `upload`.

use amf_server::{CommandContext, CommandHandler, CommandRegistry};
use async_trait::async_trait;
use axum::Json;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

/// `?cmd=modules`: the loaded modules and their remote methods.
pub struct ModulesCommand;

#[async_trait]
impl CommandHandler for ModulesCommand {
    async fn handle(&self, _request: Request, ctx: &CommandContext) -> Response {
        let modules: Vec<Value> = ctx
            .dispatcher
            .env()
            .registry()
            .descriptors()
            .map(|descriptor| {
                let methods: Map<String, Value> = descriptor
                    .remote_methods()
                    .into_iter()
                    .map(|(name, arity)| (name.to_owned(), Value::from(arity)))
                    .collect();
                json!({
                    "name": descriptor.name(),
                    "lifecycle": descriptor.lifecycle(),
                    "dependencies": descriptor.dependencies(),
                    "methods": methods,
                })
            })
            .collect();
        Json(json!({ "modules": modules })).into_response()
    }
}

/// Every bundled command.
pub fn commands() -> CommandRegistry {
    let mut commands = CommandRegistry::new();
    let _ = commands.register("modules", ModulesCommand);
    commands
}
