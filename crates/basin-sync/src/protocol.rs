//! Sync session state machine.
//!
//! A session is one pairwise sync round over a connection-scoped
//! transport. Both sides run the same algorithm:
//!
//! 1. Handshake: exchange `Hello` (identity + protocol version), then
//!    `Cursors` (how far each side has applied the other's log).
//! 2. Exchanging: stream `Entries` batches from the local log, starting
//!    just past the peer's applied cursor, in seq order, while applying
//!    the peer's batches as they arrive. Both directions run at once, so
//!    a bounded byte-stream transport is always drained by the side
//!    whose pipe the other is filling.
//! 3. Reconciling: the local stream is flushed; keep applying the peer's
//!    remaining entries, acknowledge each collection once its stream
//!    completes, and prune the local log when every known peer has
//!    acknowledged a prefix.
//!
//! Cursors are persisted after every applied batch, so an interrupted
//! session resumes from the last committed position without re-applying
//! history (re-application would be harmless anyway; see `reconcile`).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use basin_core::{now_millis, CollectionId, ReplicaId};
use basin_merge::PolicyRegistry;
use basin_store::{KeyLocks, PeerState, Store};

use crate::error::{Result, SyncError};
use crate::messages::{CollectionCursor, SyncErrorCode, SyncMessage, PROTOCOL_VERSION};
use crate::reconcile::{apply_entry, Applied};
use crate::transport::Transport;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bound on any single network step: waiting for a peer message, or
    /// a send blocked on a full connection.
    pub message_timeout: Duration,
    /// Maximum log entries per Entries message.
    pub max_batch_size: usize,
    /// Collections to sync (empty = all local collections).
    pub collections: Vec<CollectionId>,
    /// Prune the local log when acks make a prefix causally stable.
    pub prune_on_ack: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(30),
            max_batch_size: 64,
            collections: Vec::new(),
            prune_on_ack: true,
        }
    }
}

/// Phase of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session activity.
    Idle,
    /// Exchanging Hello and Cursors.
    Handshake,
    /// Streaming local log entries while applying the peer's.
    Exchanging,
    /// Local stream flushed; applying remaining peer entries and acks.
    Reconciling,
}

/// Result of a completed sync session.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// The peer we synced with.
    pub peer: Option<ReplicaId>,
    /// Log entries sent to the peer.
    pub sent_count: usize,
    /// Log entries received from the peer.
    pub received_count: usize,
    /// Received entries that changed local state.
    pub applied_count: usize,
    /// Received entries resolved through a merge policy.
    pub merged_count: usize,
    /// Received entries already covered by local state.
    pub stale_count: usize,
    /// Local log entries pruned after causal stability.
    pub pruned_count: u64,
    /// Collections exchanged in this session.
    pub collections_synced: BTreeSet<CollectionId>,
}

/// A single sync session against one peer.
pub struct SyncSession<S: Store, T: Transport> {
    local_id: ReplicaId,
    store: Arc<S>,
    locks: Arc<KeyLocks>,
    policies: Arc<PolicyRegistry>,
    transport: T,
    config: SyncConfig,
    cancel: Option<watch::Receiver<bool>>,
    state: SessionState,
    peer_id: Option<ReplicaId>,
}

impl<S: Store, T: Transport> SyncSession<S, T> {
    pub fn new(
        local_id: ReplicaId,
        store: Arc<S>,
        locks: Arc<KeyLocks>,
        policies: Arc<PolicyRegistry>,
        transport: T,
        config: SyncConfig,
    ) -> Self {
        Self {
            local_id,
            store,
            locks,
            policies,
            transport,
            config,
            cancel: None,
            state: SessionState::Idle,
            peer_id: None,
        }
    }

    /// Attach a cancellation signal. When the watched value turns true,
    /// the session stops at the next step with `SyncError::Cancelled`,
    /// leaving cursors at their last committed values.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Current phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peer's identity, once the handshake has completed.
    pub fn peer_id(&self) -> Option<ReplicaId> {
        self.peer_id
    }

    /// Run the session to completion.
    ///
    /// On any outcome the session ends in `Idle`. Errors classified as
    /// retryable (`SyncError::is_retryable`) left cursors at committed
    /// values; a later session resumes where this one stopped.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let result = self.run_inner(&mut report).await;
        self.state = SessionState::Idle;

        match result {
            Ok(()) => {
                info!(
                    peer = %report.peer.map(|p| p.to_string()).unwrap_or_default(),
                    sent = report.sent_count,
                    received = report.received_count,
                    applied = report.applied_count,
                    merged = report.merged_count,
                    "sync session complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "sync session failed");
                // Best effort: tell the peer why we are going away.
                let code = match &e {
                    SyncError::ProtocolMismatch { .. } => SyncErrorCode::VersionMismatch,
                    SyncError::Merge(_) => SyncErrorCode::ConflictUnresolved,
                    SyncError::InvalidMessage(_) => SyncErrorCode::InvalidMessage,
                    _ => SyncErrorCode::InternalError,
                };
                let _ = send_message(
                    &self.transport,
                    self.config.message_timeout,
                    SyncMessage::Error {
                        code,
                        message: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self, report: &mut SyncReport) -> Result<()> {
        // ─── Handshake ───────────────────────────────────────────────────────
        self.state = SessionState::Handshake;
        check_cancelled(&self.cancel)?;

        let timeout = self.config.message_timeout;

        let local_collections = if self.config.collections.is_empty() {
            self.store.list_collections().await?
        } else {
            self.config.collections.clone()
        };

        send_message(
            &self.transport,
            timeout,
            SyncMessage::Hello {
                replica_id: self.local_id,
                protocol_version: PROTOCOL_VERSION,
                collections: local_collections.clone(),
            },
        )
        .await?;

        let (peer_id, peer_collections) = match recv_message(&self.transport, timeout).await? {
            SyncMessage::Hello {
                replica_id,
                protocol_version,
                collections,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(SyncError::ProtocolMismatch {
                        local: PROTOCOL_VERSION,
                        peer: protocol_version,
                    });
                }
                (replica_id, collections)
            }
            other => return Err(unexpected("Hello", &other)),
        };
        self.peer_id = Some(peer_id);
        report.peer = Some(peer_id);

        let shared: Vec<CollectionId> = local_collections
            .iter()
            .filter(|c| peer_collections.contains(c))
            .cloned()
            .collect();
        report.collections_synced.extend(shared.iter().cloned());
        debug!(peer = %peer_id, collections = shared.len(), "handshake complete");

        let mut peer_state = self
            .store
            .peer_state(&peer_id)
            .await?
            .unwrap_or_else(|| PeerState::new(peer_id, now_millis()));

        let cursors: Vec<CollectionCursor> = shared
            .iter()
            .map(|c| CollectionCursor {
                collection: c.clone(),
                applied_seq: peer_state.cursor(c).applied_seq,
            })
            .collect();
        send_message(&self.transport, timeout, SyncMessage::Cursors { cursors }).await?;

        // What the peer has applied of our log, per collection.
        let peer_applied: BTreeMap<CollectionId, u64> =
            match recv_message(&self.transport, timeout).await? {
                SyncMessage::Cursors { cursors } => cursors
                    .into_iter()
                    .map(|c| (c.collection, c.applied_seq))
                    .collect(),
                other => return Err(unexpected("Cursors", &other)),
            };

        // ─── Exchange ────────────────────────────────────────────────────────
        // Outgoing and incoming run concurrently: while we stream batches
        // the peer's batches are drained and applied. Two sessions over a
        // bounded transport therefore cannot both block on a full pipe.
        self.state = SessionState::Exchanging;

        let expected: BTreeSet<CollectionId> = shared.iter().cloned().collect();
        let transport = &self.transport;
        let store = &self.store;
        let locks = &self.locks;
        let policies = &self.policies;
        let config = &self.config;
        let cancel = &self.cancel;
        let state = &mut self.state;

        let outgoing = async {
            let mut sent = 0usize;
            for collection in &shared {
                let mut cursor = peer_applied.get(collection).copied().unwrap_or(0);
                loop {
                    check_cancelled(cancel)?;

                    let entries = store
                        .log_entries_since(collection, cursor, config.max_batch_size)
                        .await?;
                    let done = entries.len() < config.max_batch_size;

                    if let Some(last) = entries.last() {
                        cursor = last.seq;
                    }
                    sent += entries.len();

                    send_message(
                        transport,
                        config.message_timeout,
                        SyncMessage::Entries {
                            collection: collection.clone(),
                            entries,
                            done,
                        },
                    )
                    .await?;

                    if done {
                        break;
                    }
                }
            }
            *state = SessionState::Reconciling;
            Ok::<usize, SyncError>(sent)
        };

        let incoming = async {
            let mut done_received: BTreeSet<CollectionId> = BTreeSet::new();
            let mut acks_received: BTreeSet<CollectionId> = BTreeSet::new();
            let mut bye_sent = false;
            let mut bye_received = false;

            if expected.is_empty() {
                send_message(transport, config.message_timeout, SyncMessage::Bye).await?;
                bye_sent = true;
            }

            while !(bye_sent && bye_received) {
                check_cancelled(cancel)?;

                match recv_message(transport, config.message_timeout).await? {
                    SyncMessage::Entries {
                        collection,
                        entries,
                        done,
                    } => {
                        if !expected.contains(&collection) {
                            return Err(SyncError::InvalidMessage(format!(
                                "entries for unannounced collection {}",
                                collection
                            )));
                        }

                        let mut applied_through = peer_state.cursor(&collection).applied_seq;
                        for entry in &entries {
                            check_cancelled(cancel)?;

                            match apply_entry(store.as_ref(), locks, policies, entry).await? {
                                Applied::Applied => report.applied_count += 1,
                                Applied::Merged => report.merged_count += 1,
                                Applied::Stale => report.stale_count += 1,
                            }
                            report.received_count += 1;
                            applied_through = applied_through.max(entry.seq);
                        }

                        // Commit the cursor only after the whole batch applied.
                        if applied_through > peer_state.cursor(&collection).applied_seq {
                            peer_state.set_applied(
                                collection.clone(),
                                applied_through,
                                now_millis(),
                            );
                            store.upsert_peer_state(&peer_state).await?;
                        }

                        if done {
                            done_received.insert(collection.clone());
                            send_message(
                                transport,
                                config.message_timeout,
                                SyncMessage::Ack {
                                    collection,
                                    through_seq: applied_through,
                                },
                            )
                            .await?;
                        }
                    }

                    SyncMessage::Ack {
                        collection,
                        through_seq,
                    } => {
                        peer_state.set_acked(collection.clone(), through_seq, now_millis());
                        store.upsert_peer_state(&peer_state).await?;
                        acks_received.insert(collection.clone());

                        if config.prune_on_ack {
                            report.pruned_count +=
                                prune_stable(store.as_ref(), &collection).await?;
                        }
                    }

                    SyncMessage::Bye => {
                        bye_received = true;
                    }

                    SyncMessage::Error { code, message } => {
                        return Err(SyncError::PeerError { code, message });
                    }

                    other => return Err(unexpected("Entries, Ack, or Bye", &other)),
                }

                // The peer acks a collection only after receiving our
                // final batch for it, so all acks in means our stream is
                // fully delivered and Bye cannot overtake it.
                if !bye_sent && done_received == expected && acks_received == expected {
                    send_message(transport, config.message_timeout, SyncMessage::Bye).await?;
                    bye_sent = true;
                }
            }

            Ok::<(), SyncError>(())
        };

        let (sent, ()) = tokio::try_join!(outgoing, incoming)?;
        report.sent_count = sent;

        Ok(())
    }
}

/// Send bounded by the session timeout: a peer that stops draining the
/// connection surfaces as a retryable `Timeout` instead of a wedged send.
async fn send_message<T: Transport>(
    transport: &T,
    timeout: Duration,
    message: SyncMessage,
) -> Result<()> {
    match tokio::time::timeout(timeout, transport.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(format!("send blocked for {:?}", timeout))),
    }
}

async fn recv_message<T: Transport>(transport: &T, timeout: Duration) -> Result<SyncMessage> {
    match transport.recv_timeout(timeout).await? {
        Some(message) => {
            message
                .validate_limits()
                .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
            Ok(message)
        }
        None => Err(SyncError::Timeout(format!("no message within {:?}", timeout))),
    }
}

fn check_cancelled(cancel: &Option<watch::Receiver<bool>>) -> Result<()> {
    if let Some(cancel) = cancel {
        if *cancel.borrow() {
            return Err(SyncError::Cancelled);
        }
    }
    Ok(())
}

/// Prune a collection's log up to the seq every known peer has acked.
async fn prune_stable<S: Store + ?Sized>(store: &S, collection: &CollectionId) -> Result<u64> {
    let mut stable = u64::MAX;
    for peer in store.list_peers().await? {
        let acked = match store.peer_state(&peer).await? {
            Some(state) => state.cursor(collection).acked_seq,
            None => 0,
        };
        stable = stable.min(acked);
    }

    if stable == u64::MAX || stable == 0 {
        return Ok(0);
    }

    let pruned = store.prune_log(collection, stable).await?;
    if pruned > 0 {
        debug!(collection = %collection, through = stable, pruned, "log pruned at stability");
    }
    Ok(pruned)
}

fn unexpected(expected: &str, got: &SyncMessage) -> SyncError {
    SyncError::InvalidMessage(format!(
        "expected {}, got {:?}",
        expected,
        std::mem::discriminant(got)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::verify_convergence;
    use crate::transport::memory::duplex_pair;
    use basin_core::{Key, Record, VersionVector};
    use basin_store::MemoryStore;

    fn rid(b: u8) -> ReplicaId {
        ReplicaId::from_bytes([b; 16])
    }

    fn collection() -> CollectionId {
        CollectionId::new("todos").unwrap()
    }

    async fn replica(id: u8) -> (ReplicaId, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.create_collection(&collection()).await.unwrap();
        (rid(id), store)
    }

    async fn put(store: &MemoryStore, origin: ReplicaId, k: &str, v: &str, ts: i64) {
        let current = store
            .get_record(&collection(), &Key::from_str_key(k).unwrap())
            .await
            .unwrap();
        let mut version = current.map(|r| r.version).unwrap_or_else(VersionVector::new);
        version.bump(origin);
        let record = Record::new(Key::from_str_key(k).unwrap(), v.to_string(), version, ts, origin);
        store.commit_write(&collection(), &record).await.unwrap();
    }

    fn session<T: Transport>(
        id: ReplicaId,
        store: Arc<MemoryStore>,
        transport: T,
    ) -> SyncSession<MemoryStore, T> {
        SyncSession::new(
            id,
            store,
            Arc::new(KeyLocks::default()),
            Arc::new(PolicyRegistry::new()),
            transport,
            SyncConfig {
                message_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
    }

    async fn sync_pair(
        a_id: ReplicaId,
        a_store: Arc<MemoryStore>,
        b_id: ReplicaId,
        b_store: Arc<MemoryStore>,
    ) -> (SyncReport, SyncReport) {
        let (ta, tb) = duplex_pair();
        let mut sa = session(a_id, a_store, ta);
        let mut sb = session(b_id, b_store, tb);

        let ha = tokio::spawn(async move { sa.run().await });
        let hb = tokio::spawn(async move { sb.run().await });

        (ha.await.unwrap().unwrap(), hb.await.unwrap().unwrap())
    }

    #[tokio::test]
    async fn test_disjoint_writes_converge() {
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;

        put(&a_store, a_id, "a1", "from-a", 100).await;
        put(&a_store, a_id, "a2", "from-a", 101).await;
        put(&b_store, b_id, "b1", "from-b", 102).await;

        let (ra, rb) = sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;

        assert_eq!(ra.sent_count, 2);
        assert_eq!(ra.received_count, 1);
        assert_eq!(rb.sent_count, 1);
        assert_eq!(rb.applied_count, 2);
        assert!(verify_convergence(&*a_store, &*b_store, &collection()).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_conflict_resolves_identically() {
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;

        // Both write "x" without having seen the other's write.
        put(&a_store, a_id, "x", "1", 100).await;
        put(&b_store, b_id, "x", "2", 200).await;

        let (ra, rb) = sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;
        assert_eq!(ra.merged_count + rb.merged_count, 2);

        let key = Key::from_str_key("x").unwrap();
        let at_a = a_store.get_record(&collection(), &key).await.unwrap().unwrap();
        let at_b = b_store.get_record(&collection(), &key).await.unwrap().unwrap();

        // Later timestamp wins on both sides; merged vector covers both.
        assert_eq!(at_a.value, "2");
        assert_eq!(at_a.value, at_b.value);
        let expected: VersionVector = [(rid(1), 1), (rid(2), 1)].into_iter().collect();
        assert_eq!(at_a.version, expected);
        assert_eq!(at_b.version, expected);
    }

    #[tokio::test]
    async fn test_second_round_sends_nothing_new() {
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;

        put(&a_store, a_id, "k", "v", 100).await;

        sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;
        let (ra, rb) = sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;

        // B re-logged the applied entry, so A may see it again; it must
        // land as stale, never as a second application.
        assert_eq!(ra.applied_count, 0);
        assert_eq!(ra.merged_count, 0);
        assert_eq!(rb.applied_count, 0);
        assert_eq!(rb.merged_count, 0);
    }

    #[tokio::test]
    async fn test_ack_triggers_prune() {
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;

        put(&a_store, a_id, "k", "v", 100).await;

        let (ra, _rb) = sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;

        // B acked A's single entry; A is the only knower of one peer, so
        // the prefix is stable and pruned.
        assert!(ra.pruned_count >= 1);
        let remaining = a_store
            .log_entries_since(&collection(), 0, 100)
            .await
            .unwrap();
        assert!(remaining.is_empty());
        // Head survives pruning: new writes continue the sequence.
        assert!(a_store.log_head(&collection()).await.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_bulk_exchange_over_small_framed_pipe() {
        // Both sides carry far more data than the pipe buffers. The
        // exchange completes only if each side keeps draining while it
        // sends.
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;

        let big = "x".repeat(4096);
        for i in 0..96u32 {
            put(&a_store, a_id, &format!("a{:03}", i), &big, 100 + i as i64).await;
            put(&b_store, b_id, &format!("b{:03}", i), &big, 100 + i as i64).await;
        }

        let (stream_a, stream_b) = tokio::io::duplex(8 * 1024);
        let mut sa = session(
            a_id,
            Arc::clone(&a_store),
            crate::framed::FramedTransport::new(stream_a),
        );
        let mut sb = session(
            b_id,
            Arc::clone(&b_store),
            crate::framed::FramedTransport::new(stream_b),
        );

        let ha = tokio::spawn(async move { sa.run().await });
        let hb = tokio::spawn(async move { sb.run().await });
        let ra = ha.await.unwrap().unwrap();
        let rb = hb.await.unwrap().unwrap();

        assert_eq!(ra.sent_count, 96);
        assert_eq!(rb.sent_count, 96);
        assert!(verify_convergence(&*a_store, &*b_store, &collection()).await.unwrap());
    }

    #[tokio::test]
    async fn test_send_blocked_on_full_pipe_times_out() {
        let (a_id, a_store) = replica(1).await;

        // The peer end stays open but never reads. Hello cannot fit in
        // the pipe, so the session must give up within its timeout.
        let (stream, _held_open) = tokio::io::duplex(16);
        let mut sa = SyncSession::new(
            a_id,
            a_store,
            Arc::new(KeyLocks::default()),
            Arc::new(PolicyRegistry::new()),
            crate::framed::FramedTransport::new(stream),
            SyncConfig {
                message_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );

        let err = sa.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
        assert!(err.is_retryable());
        assert_eq!(sa.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_is_terminal() {
        let (a_id, a_store) = replica(1).await;
        let (ta, tb) = duplex_pair();

        let mut sa = session(a_id, a_store, ta);
        let handle = tokio::spawn(async move { sa.run().await });

        // Scripted peer speaks a future protocol version.
        tb.send(SyncMessage::Hello {
            replica_id: rid(9),
            protocol_version: PROTOCOL_VERSION + 1,
            collections: vec![collection()],
        })
        .await
        .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::ProtocolMismatch { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancellation_surfaces_cancelled() {
        let (a_id, a_store) = replica(1).await;
        let (ta, _tb) = duplex_pair();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let mut sa = session(a_id, a_store, ta).with_cancellation(rx);
        let err = sa.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(sa.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_cursors_survive_for_resume() {
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;

        put(&a_store, a_id, "k1", "v1", 100).await;
        sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;

        let state = b_store.peer_state(&a_id).await.unwrap().unwrap();
        assert_eq!(state.cursor(&collection()).applied_seq, 1);

        // A writes more; the next round streams only the new entry.
        put(&a_store, a_id, "k2", "v2", 200).await;
        let (ra, _) = sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;
        assert_eq!(ra.sent_count, 1);
    }

    #[tokio::test]
    async fn test_three_replicas_transitive_propagation() {
        let (a_id, a_store) = replica(1).await;
        let (b_id, b_store) = replica(2).await;
        let (c_id, c_store) = replica(3).await;

        put(&a_store, a_id, "k", "v", 100).await;

        // A ↔ B, then B ↔ C: C learns A's write through B.
        sync_pair(a_id, Arc::clone(&a_store), b_id, Arc::clone(&b_store)).await;
        sync_pair(b_id, Arc::clone(&b_store), c_id, Arc::clone(&c_store)).await;

        let got = c_store
            .get_record(&collection(), &Key::from_str_key("k").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.value, "v");
        assert_eq!(got.origin, a_id);
    }
}
