//! Receiving shared resource roots from a peer.
//!
//! Incoming files are staged in memory and only written once the sender
//! reports the transfer complete, so a cancelled transfer leaves no partial
//! copy behind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tandem_common::{NegotiationId, PeerId, ResourceRootId, SessionId};
use tracing::{debug, info, warn};

use super::handle::{unexpected, Abort, NegotiationHandle};
use super::{
    CancelOption, Direction, NegotiationKind, NegotiationOutcome, NegotiationState,
};
use crate::manager::SessionManager;
use crate::progress::ProgressMonitor;
use crate::protocol::{FileListManifest, FileRequest, NegotiationMessage};
use crate::resources::{checksum, validate_relative_path, validate_root_name};
use crate::session::{Session, ShareOutcome};

pub struct IncomingProjectNegotiation {
    handle: Arc<NegotiationHandle>,
    manager: Arc<SessionManager>,
    session_id: SessionId,
    manifests: Vec<FileListManifest>,
}

/// A root the receiver decided to take, with what it still needs.
struct Accepted<'a> {
    manifest: &'a FileListManifest,
    target: String,
    wanted: BTreeSet<String>,
}

impl IncomingProjectNegotiation {
    pub(crate) fn new(
        manager: Arc<SessionManager>,
        offerer: PeerId,
        negotiation_id: NegotiationId,
        session_id: SessionId,
        manifests: Vec<FileListManifest>,
    ) -> Arc<Self> {
        let handle = NegotiationHandle::register(
            manager.registry(),
            Arc::clone(manager.transport()),
            manager.config().monitor_poll_interval,
            negotiation_id,
            offerer,
            NegotiationKind::Project,
            Direction::Incoming,
            NegotiationState::Offered,
        );
        Arc::new(Self {
            handle,
            manager,
            session_id,
            manifests,
        })
    }

    pub fn handle(&self) -> &Arc<NegotiationHandle> {
        &self.handle
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn manifests(&self) -> &[FileListManifest] {
        &self.manifests
    }

    /// Take the offered roots. `targets` maps each wanted root to the local
    /// root path its files are written to; roots without a target are
    /// declined.
    pub async fn accept(
        &self,
        targets: HashMap<ResourceRootId, String>,
        monitor: &dyn ProgressMonitor,
    ) -> NegotiationOutcome {
        if !self.handle.begin_run() {
            return self.handle.wait_terminal().await;
        }
        let result = self.receive(&targets, monitor).await;
        let (result, announced) = match result {
            Ok((session, announced)) => (Ok(()), Some((session, announced))),
            Err(abort) => (Err(abort), None),
        };
        let outcome = self.handle.conclude(result).await;
        if let (true, Some((session, announced))) = (outcome.is_completed(), announced) {
            for root in &announced {
                self.manager.fire_resources_available(&session, root);
            }
        }
        monitor.done();
        outcome
    }

    pub async fn reject(&self, reason: impl Into<String>) {
        self.handle
            .local_cancel(reason, CancelOption::NotifyPeer)
            .await;
    }

    async fn receive(
        &self,
        targets: &HashMap<ResourceRootId, String>,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(Arc<Session>, Vec<ResourceRootId>), Abort> {
        let config = self.manager.config();
        let resources = self.manager.resources();
        let peer = self.handle.peer();
        let negotiation_id = self.handle.id().clone();

        self.handle.set_state(NegotiationState::NegotiatingFileList);
        let session = self
            .manager
            .wait_for_session(&self.session_id, config.response_timeout)
            .await
            .ok_or_else(|| Abort::Failed(format!("session {} is not active", self.session_id)))?;

        for manifest in &self.manifests {
            validate_root_name(&manifest.name).map_err(|e| Abort::Failed(e.to_string()))?;
            for file in &manifest.files {
                validate_relative_path(&file.path).map_err(|e| Abort::Failed(e.to_string()))?;
            }
            if let Some(target) = targets.get(&manifest.root_id) {
                validate_relative_path(target).map_err(|e| Abort::Failed(e.to_string()))?;
            }
        }

        let mut accepted: BTreeMap<ResourceRootId, Accepted<'_>> = BTreeMap::new();
        for manifest in &self.manifests {
            let Some(target) = targets.get(&manifest.root_id) else {
                debug!(root = %manifest.name, "No target for offered root; declining it");
                continue;
            };
            let mut wanted = BTreeSet::new();
            for file in &manifest.files {
                self.handle.checkpoint(monitor)?;
                let up_to_date = match resources.read(target, &file.path).await {
                    Ok(local) => checksum(&local) == file.checksum,
                    Err(_) => false,
                };
                if !up_to_date {
                    wanted.insert(file.path.clone());
                }
            }
            accepted.insert(
                manifest.root_id.clone(),
                Accepted {
                    manifest,
                    target: target.clone(),
                    wanted,
                },
            );
        }

        let requests: Vec<FileRequest> = accepted
            .iter()
            .filter(|(_, root)| !root.wanted.is_empty())
            .map(|(id, root)| FileRequest {
                root_id: id.clone(),
                paths: root.wanted.iter().cloned().collect(),
            })
            .collect();
        let total: usize = requests.iter().map(|r| r.paths.len()).sum();
        self.manager
            .transport()
            .send(
                peer,
                NegotiationMessage::ProjectResponse {
                    negotiation_id: negotiation_id.clone(),
                    wanted: requests,
                },
            )
            .await
            .map_err(|e| Abort::Failed(format!("could not send project response: {e}")))?;

        self.handle.set_state(NegotiationState::Transferring);
        monitor.begin("receiving files", total as u64);
        let mut staged: Vec<(ResourceRootId, String, Vec<u8>)> = Vec::with_capacity(total);
        loop {
            match self
                .handle
                .next_message(config.response_timeout, monitor, "file data")
                .await?
            {
                NegotiationMessage::FileData {
                    root_id,
                    path,
                    content,
                    ..
                } => {
                    let Some(root) = accepted.get(&root_id) else {
                        return Err(Abort::Failed(format!("received file for unknown root {root_id}")));
                    };
                    if !root.wanted.contains(&path) {
                        return Err(Abort::Failed(format!("received unrequested file {path}")));
                    }
                    let expected = root.manifest.files.iter().find(|f| f.path == path);
                    if expected.is_some_and(|f| f.checksum != checksum(&content)) {
                        return Err(Abort::Failed(format!("checksum mismatch for {path}")));
                    }
                    staged.push((root_id, path, content));
                    monitor.worked(1);
                }
                NegotiationMessage::TransferComplete { .. } => break,
                other => return Err(unexpected(&other, "file data")),
            }
        }
        if staged.len() < total {
            warn!(
                negotiation_id = %negotiation_id,
                expected = total,
                received = staged.len(),
                "Transfer finished with missing files"
            );
        }

        self.handle.checkpoint(monitor)?;
        for (root_id, path, content) in &staged {
            let Some(root) = accepted.get(root_id) else {
                continue;
            };
            if let Err(e) = resources.write(&root.target, path, content).await {
                warn!(root = %root.target, path = %path, error = %e, "Could not write received file");
            }
        }

        let mut announced = Vec::new();
        for (root_id, root) in &accepted {
            let files = (!root.manifest.complete)
                .then(|| root.manifest.files.iter().map(|f| f.path.clone()).collect());
            match session.share_root(root_id.clone(), peer.clone(), &root.target, files) {
                ShareOutcome::Added | ShareOutcome::Extended(_) => announced.push(root_id.clone()),
                ShareOutcome::Unchanged => {}
            }
        }

        self.manager
            .transport()
            .send(peer, NegotiationMessage::ProjectAcknowledged { negotiation_id })
            .await
            .map_err(|e| Abort::Failed(format!("could not acknowledge project: {e}")))?;
        info!(
            session_id = %self.session_id,
            peer = %peer,
            roots = accepted.len(),
            files = staged.len(),
            "Project received"
        );
        Ok((session, announced))
    }
}
