//! Sending shared resource roots to a peer that is already in the session.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tandem_common::{NegotiationId, PeerId, ResourceRootId};
use tracing::{debug, info, warn};

use super::handle::{unexpected, Abort, NegotiationHandle};
use super::{Direction, NegotiationKind, NegotiationOutcome, NegotiationState};
use crate::manager::SessionManager;
use crate::progress::ProgressMonitor;
use crate::protocol::{FileEntry, FileListManifest, FileRequest, NegotiationMessage};
use crate::resources::{checksum, root_name};
use crate::session::Session;

/// One root offered to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootOffer {
    pub id: ResourceRootId,
    /// Path the local resource provider knows the root by.
    pub path: String,
    /// `None` offers every file of the root.
    pub files: Option<Vec<String>>,
}

pub struct OutgoingProjectNegotiation {
    handle: Arc<NegotiationHandle>,
    manager: Arc<SessionManager>,
    session: Arc<Session>,
    roots: Vec<RootOffer>,
}

impl OutgoingProjectNegotiation {
    pub(crate) fn new(
        manager: Arc<SessionManager>,
        session: Arc<Session>,
        peer: PeerId,
        roots: Vec<RootOffer>,
    ) -> Arc<Self> {
        let handle = NegotiationHandle::register(
            manager.registry(),
            Arc::clone(manager.transport()),
            manager.config().monitor_poll_interval,
            NegotiationId::new(),
            peer,
            NegotiationKind::Project,
            Direction::Outgoing,
            NegotiationState::Created,
        );
        Arc::new(Self {
            handle,
            manager,
            session,
            roots,
        })
    }

    pub fn handle(&self) -> &Arc<NegotiationHandle> {
        &self.handle
    }

    pub fn roots(&self) -> &[RootOffer] {
        &self.roots
    }

    /// Offer the roots and stream whatever the peer asks for.
    pub async fn run(&self, monitor: &dyn ProgressMonitor) -> NegotiationOutcome {
        if !self.handle.begin_run() {
            return self.handle.wait_terminal().await;
        }
        let result = self.transfer(monitor).await;
        let outcome = self.handle.conclude(result).await;
        monitor.done();
        outcome
    }

    async fn transfer(&self, monitor: &dyn ProgressMonitor) -> Result<(), Abort> {
        let config = self.manager.config();
        let transport = self.manager.transport();
        let peer = self.handle.peer();
        let negotiation_id = self.handle.id().clone();

        self.handle.set_state(NegotiationState::Offered);
        let manifests = self.build_manifests(monitor).await?;
        let offered: HashMap<&ResourceRootId, (&str, BTreeSet<&str>)> = manifests
            .iter()
            .map(|(manifest, path)| {
                let files = manifest.files.iter().map(|f| f.path.as_str()).collect();
                (&manifest.root_id, (path.as_str(), files))
            })
            .collect();

        transport
            .send(
                peer,
                NegotiationMessage::ProjectOffer {
                    session_id: self.session.id().clone(),
                    negotiation_id: negotiation_id.clone(),
                    manifests: manifests.iter().map(|(m, _)| m.clone()).collect(),
                },
            )
            .await
            .map_err(|e| Abort::Failed(format!("could not send project offer: {e}")))?;
        info!(
            session_id = %self.session.id(),
            peer = %peer,
            roots = manifests.len(),
            "Project offer sent"
        );

        self.handle.set_state(NegotiationState::NegotiatingFileList);
        let wanted: Vec<FileRequest> = match self
            .handle
            .next_message(config.acceptance_timeout, monitor, "project response")
            .await?
        {
            NegotiationMessage::ProjectResponse { wanted, .. } => wanted,
            other => return Err(unexpected(&other, "project response")),
        };

        self.handle.set_state(NegotiationState::Transferring);
        let total: usize = wanted.iter().map(|request| request.paths.len()).sum();
        monitor.begin("sending files", total as u64);
        for request in &wanted {
            let Some((root_path, files)) = offered.get(&request.root_id) else {
                return Err(Abort::Failed(format!(
                    "peer requested unknown root {}",
                    request.root_id
                )));
            };
            for path in &request.paths {
                if !files.contains(path.as_str()) {
                    return Err(Abort::Failed(format!("peer requested unknown file {path}")));
                }
                self.handle.checkpoint(monitor)?;
                let content = match self.manager.resources().read(root_path, path).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(root = %root_path, path = %path, error = %e, "Could not read file; skipping");
                        continue;
                    }
                };
                transport
                    .send(
                        peer,
                        NegotiationMessage::FileData {
                            negotiation_id: negotiation_id.clone(),
                            root_id: request.root_id.clone(),
                            path: path.clone(),
                            content,
                        },
                    )
                    .await
                    .map_err(|e| Abort::Failed(format!("could not send {path}: {e}")))?;
                monitor.worked(1);
            }
        }

        transport
            .send(
                peer,
                NegotiationMessage::TransferComplete {
                    negotiation_id: negotiation_id.clone(),
                },
            )
            .await
            .map_err(|e| Abort::Failed(format!("could not finish transfer: {e}")))?;

        match self
            .handle
            .next_message(config.response_timeout, monitor, "project acknowledgement")
            .await?
        {
            NegotiationMessage::ProjectAcknowledged { .. } => Ok(()),
            other => Err(unexpected(&other, "project acknowledgement")),
        }
    }

    /// One manifest per root that could be read. Roots and files that fail
    /// are logged and left out.
    async fn build_manifests(
        &self,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<(FileListManifest, String)>, Abort> {
        let resources = self.manager.resources();
        let mut manifests = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            self.handle.checkpoint(monitor)?;
            let paths = match &root.files {
                Some(files) => files.clone(),
                None => match resources.enumerate(&root.path).await {
                    Ok(paths) => paths,
                    Err(e) => {
                        warn!(root = %root.path, error = %e, "Could not enumerate resource root; skipping");
                        continue;
                    }
                },
            };
            let mut files = Vec::with_capacity(paths.len());
            for path in paths {
                match resources.read(&root.path, &path).await {
                    Ok(content) => files.push(FileEntry {
                        size: content.len() as u64,
                        checksum: checksum(&content),
                        path,
                    }),
                    Err(e) => {
                        warn!(root = %root.path, path = %path, error = %e, "Could not read file; leaving it out")
                    }
                }
            }
            debug!(root = %root.path, files = files.len(), "Manifest built");
            manifests.push((
                FileListManifest {
                    root_id: root.id.clone(),
                    name: root_name(&root.path),
                    files,
                    complete: root.files.is_none(),
                },
                root.path.clone(),
            ));
        }
        Ok(manifests)
    }
}
