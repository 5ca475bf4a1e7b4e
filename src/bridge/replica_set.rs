//! Replica-set proxy (`rs`)
//!
//! Every method issues one fixed command against `admin`. Failures are
//! returned as `{ok: 0, errmsg}` documents instead of errors.

use std::sync::Arc;

use mongodb::bson::{Bson, Document, doc};
use tracing::{debug, error};

use super::value::{BoundMethod, ProxyObject, ShellValue};
use super::{arg, not_a_function};
use crate::error::Result;
use crate::translator::{CommandTranslator, convert};

const DEFAULT_STEP_DOWN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaSetMethod {
    Status,
    Conf,
    IsMaster,
    Initiate,
    StepDown,
}

impl ReplicaSetMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "conf" => Some(Self::Conf),
            "isMaster" => Some(Self::IsMaster),
            "initiate" => Some(Self::Initiate),
            "stepDown" => Some(Self::StepDown),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ReplicaSetProxy {
    translator: Arc<CommandTranslator>,
}

impl ReplicaSetProxy {
    pub fn new(translator: Arc<CommandTranslator>) -> Self {
        Self { translator }
    }

    pub fn get_member(self: &Arc<Self>, name: &str) -> ShellValue {
        match ReplicaSetMethod::from_name(name) {
            Some(_) => ShellValue::Method(BoundMethod {
                receiver: ProxyObject::ReplicaSet(Arc::clone(self)),
                name: name.to_string(),
            }),
            None => ShellValue::Null,
        }
    }

    pub async fn invoke(&self, name: &str, args: &[ShellValue]) -> Result<ShellValue> {
        let Some(method) = ReplicaSetMethod::from_name(name) else {
            return Err(not_a_function(&format!("rs.{name}")));
        };
        Ok(ShellValue::from(self.run(command_for(method, arg(args, 0))).await))
    }

    async fn run(&self, command: Document) -> Document {
        debug!("rs: {}", command);
        match self.translator.run_admin_command(command).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("replica set command failed: {}", e);
                doc! { "ok": 0, "errmsg": e.to_string() }
            }
        }
    }
}

fn command_for(method: ReplicaSetMethod, argument: &ShellValue) -> Document {
    match method {
        ReplicaSetMethod::Status => doc! { "replSetGetStatus": 1 },
        ReplicaSetMethod::Conf => doc! { "replSetGetConfig": 1 },
        ReplicaSetMethod::IsMaster => doc! { "isMaster": 1 },
        ReplicaSetMethod::Initiate => match convert(argument) {
            Bson::Document(config) => doc! { "replSetInitiate": config },
            _ => doc! { "replSetInitiate": 1 },
        },
        ReplicaSetMethod::StepDown => {
            let secs = argument
                .as_f64()
                .map(|s| s as i64)
                .unwrap_or(DEFAULT_STEP_DOWN_SECS);
            doc! { "replSetStepDown": secs }
        }
    }
}
