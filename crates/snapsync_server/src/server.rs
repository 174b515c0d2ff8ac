//! Main replication server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use snapsync_core::{ReplicationClients, Reaper, SessionRegistry};
use snapsync_protocol::{
    BarrierCreated, BindKeysRequest, ChunkList, ChunkPage, CreateSessionRequest, DumpRequest,
    DumpResponse, FetchChunkRequest, InventoryRequest, InventoryResponse, KeysBound,
    ListChunksRequest, OpenTransactionsResponse, RemoveKeysAck, RenewSessionRequest,
    SessionCreated, TailRequest, TailResponse,
};
use snapsync_storage::{ChangeLog, InMemoryEngine, StorageEngine, Tick};
use std::sync::Arc;

/// The replication server.
///
/// Owns the engine handle, the session registry, the follower table and
/// the background reaper, and serves the leader side of replication:
/// snapshot sessions, chunked key synchronization, collection dumps and
/// log tailing.
///
/// # Example
///
/// ```
/// use snapsync_server::{ReplicationServer, ServerConfig};
/// use snapsync_protocol::CreateSessionRequest;
/// use snapsync_storage::InMemoryEngine;
/// use std::sync::Arc;
///
/// let engine = Arc::new(InMemoryEngine::new());
/// engine.create_database("app").unwrap();
/// let server = ReplicationServer::new(engine, ServerConfig::default().with_reaper(false));
///
/// let created = server
///     .create_session(CreateSessionRequest {
///         database: "app".into(),
///         ttl: None,
///         server_id: None,
///     })
///     .unwrap();
/// assert_eq!(created.last_tick, 0);
/// ```
pub struct ReplicationServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    reaper: Option<Reaper>,
}

impl ReplicationServer {
    /// Creates a server over `engine`.
    pub fn new(engine: Arc<InMemoryEngine>, config: ServerConfig) -> Self {
        let context = Arc::new(HandlerContext::new(config, engine));
        let handler = RequestHandler::new(Arc::clone(&context));
        let reaper = context.config.spawn_reaper.then(|| {
            Reaper::spawn(
                Arc::clone(&context.registry),
                context.config.replication.reaper_interval,
            )
        });
        tracing::info!(reaper = reaper.is_some(), "replication server started");
        Self {
            handler,
            context,
            reaper,
        }
    }

    /// Creates a snapshot session.
    pub fn create_session(&self, request: CreateSessionRequest) -> ServerResult<SessionCreated> {
        self.handler.handle_create_session(request)
    }

    /// Renews a snapshot session.
    pub fn renew_session(&self, request: RenewSessionRequest) -> ServerResult<SessionCreated> {
        self.handler.handle_renew_session(request)
    }

    /// Deletes a snapshot session.
    pub fn delete_session(&self, id: u64) -> ServerResult<()> {
        self.handler.handle_delete_session(id)
    }

    /// Returns the collection inventory of a session.
    pub fn inventory(&self, request: InventoryRequest) -> ServerResult<InventoryResponse> {
        self.handler.handle_inventory(request)
    }

    /// Binds a collection for key synchronization.
    pub fn bind_keys(&self, request: BindKeysRequest) -> ServerResult<KeysBound> {
        self.handler.handle_bind_keys(request)
    }

    /// Lists the chunks of a bound collection.
    pub fn list_chunks(&self, request: ListChunksRequest) -> ServerResult<ChunkList> {
        self.handler.handle_list_chunks(request)
    }

    /// Fetches one page of a chunk.
    pub fn fetch_chunk(&self, request: FetchChunkRequest) -> ServerResult<ChunkPage> {
        self.handler.handle_fetch_chunk(request)
    }

    /// Acknowledges a key-binding removal.
    pub fn remove_keys(&self, session_id: u64) -> RemoveKeysAck {
        self.handler.handle_remove_keys(session_id)
    }

    /// Reads a window of the change log.
    pub fn tail(&self, request: TailRequest) -> ServerResult<TailResponse> {
        self.handler.handle_tail(request)
    }

    /// Lists transactions open at the current tick.
    pub fn open_transactions(&self) -> OpenTransactionsResponse {
        self.handler.handle_open_transactions()
    }

    /// Dumps the next batch of a collection.
    pub fn dump(&self, request: DumpRequest) -> ServerResult<DumpResponse> {
        self.handler.handle_dump(request)
    }

    /// Creates a barrier.
    pub fn create_barrier(&self) -> BarrierCreated {
        self.handler.handle_create_barrier()
    }

    /// Extends a barrier.
    pub fn extend_barrier(&self, id: u64) {
        self.handler.handle_touch_barrier(id);
    }

    /// Deletes a barrier.
    pub fn delete_barrier(&self, id: u64) {
        self.handler.handle_touch_barrier(id);
    }

    /// Lists barriers.
    pub fn list_barriers(&self) -> Vec<u64> {
        self.handler.handle_list_barriers()
    }

    /// Prunes the change log through `through`, but never past the lowest
    /// tick served to a registered follower. Followers idle for longer than
    /// the configured client TTL are forgotten first.
    ///
    /// Returns the number of records removed.
    pub fn prune_log(&self, through: Tick) -> usize {
        self.context.clients.expire_idle(self.context.config.client_ttl);
        let bound = match self.context.clients.min_served_tick() {
            Some(served) if served < through => {
                tracing::debug!(%through, %served, "log pruning held back by follower");
                served
            }
            _ => through,
        };
        self.context.engine.prune_log_through(bound)
    }

    /// Discards document versions no live session can observe.
    pub fn purge_versions(&self) -> usize {
        self.context.engine.purge_versions()
    }

    /// Returns the latest tick of the change log.
    pub fn latest_tick(&self) -> Tick {
        self.context.engine.log().latest_tick()
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.context.registry
    }

    /// Returns the follower table.
    pub fn clients(&self) -> &ReplicationClients {
        &self.context.clients
    }

    /// Returns the storage engine.
    pub fn engine(&self) -> &Arc<InMemoryEngine> {
        &self.context.engine
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns true if the background reaper is running.
    pub fn reaper_running(&self) -> bool {
        self.reaper.as_ref().is_some_and(Reaper::is_running)
    }
}
