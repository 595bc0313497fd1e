use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::{
    best_detection, CoreError, DecisionPolicy, Descriptor, Detection, DistanceMatcher,
    EnrollmentRecord, Gallery, IdentityId, MatchResult, Matcher,
};
use vigil_store::{IdentitySummary, Store, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no face in the submitted detections")]
    NoFaceDetected,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of an enrollment request.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollResult {
    pub accepted: bool,
    /// Quality of the detection that was offered.
    pub quality: f32,
    /// Samples held for the identity after the request.
    pub samples: usize,
}

/// Daemon status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub identities: usize,
    pub samples: usize,
    pub policy: DecisionPolicy,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        identity: IdentityId,
        detections: Vec<Detection>,
        reply: oneshot::Sender<Result<EnrollResult, EngineError>>,
    },
    Verify {
        identity: IdentityId,
        probes: Vec<Descriptor>,
        reply: oneshot::Sender<Result<MatchResult, EngineError>>,
    },
    Identify {
        probes: Vec<Descriptor>,
        reply: oneshot::Sender<Result<MatchResult, EngineError>>,
    },
    Remove {
        identity: IdentityId,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    List {
        reply: oneshot::Sender<Result<Vec<IdentitySummary>, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Owns the gallery and the store. Lives on the engine thread only, which
/// makes it the single writer for every enrollment record.
pub struct Engine {
    gallery: Gallery,
    store: Store,
    matcher: DistanceMatcher,
}

impl Engine {
    /// Load the enrolled population from `store` under `policy`.
    pub fn new(store: Store, policy: DecisionPolicy) -> Result<Self, EngineError> {
        let matcher = DistanceMatcher::new(policy)?;
        let gallery = store.load_gallery(matcher.policy())?;
        Ok(Self {
            gallery,
            store,
            matcher,
        })
    }

    /// Enroll the best detection of a capture burst.
    ///
    /// The gallery is only changed if the store write succeeds.
    pub fn enroll(
        &mut self,
        identity: IdentityId,
        detections: &[Detection],
    ) -> Result<EnrollResult, EngineError> {
        let detection = best_detection(detections).ok_or(EngineError::NoFaceDetected)?;
        let quality = detection.quality();
        let previous = self.gallery.get(&identity).cloned();

        let accepted = self.gallery.enroll(
            identity.clone(),
            detection.descriptor.clone(),
            quality,
            self.matcher.policy(),
        )?;

        if accepted {
            if let Some(record) = self.gallery.get(&identity) {
                if let Err(err) = self.store.save_record(record) {
                    match previous {
                        Some(record) => {
                            self.gallery.insert_record(record);
                        }
                        None => {
                            self.gallery.remove(&identity);
                        }
                    }
                    return Err(err.into());
                }
            }
        }

        let samples = self.gallery.get(&identity).map_or(0, EnrollmentRecord::len);
        tracing::info!(identity = %identity, quality, accepted, samples, "enroll: processed");

        Ok(EnrollResult {
            accepted,
            quality,
            samples,
        })
    }

    /// 1:1 against the claimed identity. Unknown identities are a plain no-match.
    pub fn verify(&self, identity: &IdentityId, probes: &[Descriptor]) -> Result<MatchResult, EngineError> {
        let result = match self.gallery.get(identity) {
            Some(record) => self.matcher.verify_any(probes, record)?,
            None => {
                let empty = EnrollmentRecord::new(identity.clone(), self.matcher.policy().sample_capacity);
                self.matcher.verify_any(probes, &empty)?
            }
        };
        tracing::info!(
            identity = %identity,
            frames = probes.len(),
            matched = result.is_match(),
            similarity = result.similarity,
            tier = %result.tier,
            "verify: decided"
        );
        Ok(result)
    }

    /// 1:N against the whole gallery.
    pub fn identify(&self, probes: &[Descriptor]) -> Result<MatchResult, EngineError> {
        let result = self.matcher.identify_any(probes, &self.gallery)?;
        tracing::info!(
            frames = probes.len(),
            identity = ?result.identity.as_ref().map(IdentityId::as_str),
            similarity = result.similarity,
            tier = %result.tier,
            "identify: decided"
        );
        Ok(result)
    }

    pub fn remove(&mut self, identity: &IdentityId) -> Result<bool, EngineError> {
        let removed = self.store.remove_identity(identity)?;
        Ok(self.gallery.remove(identity).is_some() || removed)
    }

    pub fn list(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        Ok(self.store.list_identities()?)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            identities: self.gallery.len(),
            samples: self.gallery.iter().map(EnrollmentRecord::len).sum(),
            policy: self.matcher.policy().clone(),
        }
    }

    fn handle(&mut self, req: EngineRequest) {
        // A dropped receiver only means the caller went away.
        match req {
            EngineRequest::Enroll {
                identity,
                detections,
                reply,
            } => {
                let _ = reply.send(self.enroll(identity, &detections));
            }
            EngineRequest::Verify {
                identity,
                probes,
                reply,
            } => {
                let _ = reply.send(self.verify(&identity, &probes));
            }
            EngineRequest::Identify { probes, reply } => {
                let _ = reply.send(self.identify(&probes));
            }
            EngineRequest::Remove { identity, reply } => {
                let _ = reply.send(self.remove(&identity));
            }
            EngineRequest::List { reply } => {
                let _ = reply.send(self.list());
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Request enrollment of the best of `detections` for `identity`.
    pub async fn enroll(
        &self,
        identity: IdentityId,
        detections: Vec<Detection>,
    ) -> Result<EnrollResult, EngineError> {
        self.request(|reply| EngineRequest::Enroll {
            identity,
            detections,
            reply,
        })
        .await?
    }

    pub async fn verify(
        &self,
        identity: IdentityId,
        probes: Vec<Descriptor>,
    ) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::Verify {
            identity,
            probes,
            reply,
        })
        .await?
    }

    pub async fn identify(&self, probes: Vec<Descriptor>) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::Identify { probes, reply })
            .await?
    }

    pub async fn remove(&self, identity: IdentityId) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Remove { identity, reply })
            .await?
    }

    pub async fn list(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        self.request(|reply| EngineRequest::List { reply }).await?
    }

    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the gallery synchronously so startup fails fast on a bad store or
/// policy, then serves requests one at a time.
pub fn spawn_engine(
    store: Store,
    policy: DecisionPolicy,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let mut engine = Engine::new(store, policy)?;
    tracing::info!(
        identities = engine.gallery.len(),
        capacity = engine.matcher.policy().sample_capacity,
        "engine ready"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth);

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
