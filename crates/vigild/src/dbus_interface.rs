use serde::Serialize;
use vigil_core::{CoreError, Descriptor, Detection, IdentityId};
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "io.vigil.Vigil1";
pub const OBJECT_PATH: &str = "/io/vigil/Vigil1";

/// D-Bus interface for the Vigil identity verification daemon.
///
/// Bus name: io.vigil.Vigil1
/// Object path: /io/vigil/Vigil1
///
/// Descriptors travel as JSON so the interface does not depend on the
/// extraction model's dimension. Results are returned as JSON objects.
pub struct VigilService {
    engine: EngineHandle,
}

impl VigilService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "io.vigil.Vigil1")]
impl VigilService {
    /// Enroll the best of a burst of detections for the given identity.
    /// A sample that is not kept is reported with `"accepted": false`.
    async fn enroll(&self, identity: &str, detections_json: &str) -> zbus::fdo::Result<String> {
        tracing::info!(identity, "enroll requested");
        let identity = parse_identity(identity)?;
        let detections: Vec<Detection> = parse_json(detections_json)?;
        let result = self.engine.enroll(identity, detections).await.map_err(to_fdo)?;
        to_json(&result)
    }

    /// 1:1 verification of one or more probe descriptors against a claimed identity.
    async fn verify(&self, identity: &str, probes_json: &str) -> zbus::fdo::Result<String> {
        tracing::info!(identity, "verify requested");
        let identity = parse_identity(identity)?;
        let probes: Vec<Descriptor> = parse_json(probes_json)?;
        let result = self.engine.verify(identity, probes).await.map_err(to_fdo)?;
        to_json(&result)
    }

    /// 1:N identification of one or more probe descriptors.
    async fn identify(&self, probes_json: &str) -> zbus::fdo::Result<String> {
        tracing::info!("identify requested");
        let probes: Vec<Descriptor> = parse_json(probes_json)?;
        let result = self.engine.identify(probes).await.map_err(to_fdo)?;
        to_json(&result)
    }

    /// List enrolled identities with their sample counts.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let list = self.engine.list().await.map_err(to_fdo)?;
        to_json(&list)
    }

    /// Remove every stored sample of an identity.
    async fn remove_identity(&self, identity: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(identity, "remove_identity requested");
        let identity = parse_identity(identity)?;
        self.engine.remove(identity).await.map_err(to_fdo)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        to_json(&status)
    }
}

fn parse_identity(identity: &str) -> zbus::fdo::Result<IdentityId> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(zbus::fdo::Error::InvalidArgs("identity must not be empty".into()));
    }
    Ok(IdentityId::new(trimmed))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> zbus::fdo::Result<T> {
    serde_json::from_str(raw).map_err(|e| zbus::fdo::Error::InvalidArgs(format!("malformed JSON: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

/// Bad input is the caller's problem; everything else is ours.
fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Core(
            e @ (CoreError::InvalidDescriptor(_)
            | CoreError::DimensionMismatch { .. }
            | CoreError::ModelMismatch { .. }
            | CoreError::InvalidQuality(_)),
        ) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        EngineError::NoFaceDetected => zbus::fdo::Error::InvalidArgs(err.to_string()),
        other => {
            tracing::warn!(error = %other, "request failed");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}
