//! Request handlers for replication endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use snapsync_core::{
    dump, ChunkFetch, FetchMode, InventorySnapshotBuilder, KeyChunkProtocol, LogTailer,
    ReplicationClients, ReplicationError, SessionId, SessionRegistry, TailWindow,
};
use snapsync_protocol::{
    BarrierCreated, BindKeysRequest, ChunkList, ChunkPage, CreateSessionRequest, DumpRequest,
    DumpResponse, FetchChunkRequest, InventoryRequest, InventoryResponse, KeysBound,
    ListChunksRequest, OpenTransactionsResponse, RemoveKeysAck, RenewSessionRequest,
    SessionCreated, TailRequest, TailResponse,
};
use snapsync_storage::{InMemoryEngine, StorageEngine, Tick};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Client id that tails without a server id are recorded under.
const ANONYMOUS_FOLLOWER: &str = "0";

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Storage engine (shared across all handlers).
    pub engine: Arc<InMemoryEngine>,
    /// Snapshot sessions.
    pub registry: Arc<SessionRegistry>,
    /// Follower progress.
    pub clients: ReplicationClients,
    next_barrier: AtomicU64,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, engine: Arc<InMemoryEngine>) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            engine.clone(),
            config.replication.clone(),
        ));
        Self {
            config,
            engine,
            registry,
            clients: ReplicationClients::new(),
            next_barrier: AtomicU64::new(1),
        }
    }

    fn record_client(&self, server_id: Option<&str>, fallback: SessionId, tick: Tick) {
        match server_id {
            Some(id) => self.clients.record(id, tick),
            None => self.clients.record(&fallback.to_string(), tick),
        }
    }
}

/// Handler for replication requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    fn engine(&self) -> &dyn StorageEngine {
        self.context.engine.as_ref()
    }

    fn chunk_protocol(&self) -> KeyChunkProtocol {
        KeyChunkProtocol::new().with_min_chunk_size(self.context.config.replication.min_chunk_size)
    }

    /// Handles a create-session request.
    pub fn handle_create_session(
        &self,
        request: CreateSessionRequest,
    ) -> ServerResult<SessionCreated> {
        let created = self
            .context
            .registry
            .create(&request.database, ttl(request.ttl))?;
        self.context
            .record_client(request.server_id.as_deref(), created.id, created.last_tick);
        Ok(SessionCreated {
            id: created.id.as_u64(),
            last_tick: created.last_tick.as_u64(),
        })
    }

    /// Handles a renew-session request.
    pub fn handle_renew_session(
        &self,
        request: RenewSessionRequest,
    ) -> ServerResult<SessionCreated> {
        let id = SessionId::new(request.id);
        let last_tick = self
            .context
            .registry
            .renew(id, ttl(request.ttl))?
            .last_tick();
        self.context
            .record_client(request.server_id.as_deref(), id, last_tick);
        Ok(SessionCreated {
            id: request.id,
            last_tick: last_tick.as_u64(),
        })
    }

    /// Handles a delete-session request.
    pub fn handle_delete_session(&self, id: u64) -> ServerResult<()> {
        let id = SessionId::new(id);
        if self.context.registry.remove(id) {
            Ok(())
        } else {
            Err(ReplicationError::session_not_found(id).into())
        }
    }

    /// Handles an inventory request.
    pub fn handle_inventory(&self, request: InventoryRequest) -> ServerResult<InventoryResponse> {
        let include_system = request.include_system.unwrap_or(true);
        let global = request.global.unwrap_or(false);
        let builder = InventorySnapshotBuilder::new(self.engine());
        Ok(self
            .context
            .registry
            .with_session(SessionId::new(request.session_id), |session| {
                builder.build(session, include_system, global)
            })?)
    }

    /// Handles a bind-keys request.
    pub fn handle_bind_keys(&self, request: BindKeysRequest) -> ServerResult<KeysBound> {
        let protocol = self.chunk_protocol();
        let count = self
            .context
            .registry
            .with_session(SessionId::new(request.session_id), |session| {
                protocol.bind_collection(session, &request.collection)
            })?;
        Ok(KeysBound {
            id: request.session_id,
            count,
        })
    }

    /// Handles a list-chunks request.
    pub fn handle_list_chunks(&self, request: ListChunksRequest) -> ServerResult<ChunkList> {
        let chunk_size = self.context.config.chunk_size(request.chunk_size);
        let protocol = self.chunk_protocol();
        let chunks = self
            .context
            .registry
            .with_session(SessionId::new(request.session_id), |session| {
                protocol.list_chunks(session, &request.collection, chunk_size)
            })?;
        Ok(ChunkList {
            chunks: chunks.into_iter().map(Into::into).collect(),
        })
    }

    /// Handles a fetch-chunk request.
    pub fn handle_fetch_chunk(&self, request: FetchChunkRequest) -> ServerResult<ChunkPage> {
        let mode: FetchMode = request.fetch_type.parse()?;
        let index = usize::try_from(request.chunk)
            .map_err(|_| ServerError::InvalidRequest(format!("chunk {} out of range", request.chunk)))?;
        let page_size = self.context.config.chunk_size(request.chunk_size);

        let mut fetch = ChunkFetch::new(request.collection, index, page_size, mode);
        if let Some(low) = request.low {
            fetch = fetch.with_resume_low(low);
        }
        if request.offset.is_some() {
            fetch = fetch.with_byte_budget(self.context.config.docs_page_budget);
        }
        if let Some(keys) = request.keys {
            fetch = fetch.with_keys(keys);
        }

        let protocol = self.chunk_protocol();
        Ok(self
            .context
            .registry
            .with_session(SessionId::new(request.session_id), |session| {
                protocol.fetch_chunk(session, &fetch)
            })?)
    }

    /// Handles a remove-keys request. Bindings live until the session ends.
    pub fn handle_remove_keys(&self, session_id: u64) -> RemoveKeysAck {
        tracing::debug!(session = session_id, "remove keys acknowledged");
        RemoveKeysAck::accepted(session_id.to_string())
    }

    /// Handles a tail request.
    ///
    /// A non-empty batch records the follower's progress like session
    /// create and renew do. Tails without a server id have no session to
    /// fall back on and share one anonymous entry.
    pub fn handle_tail(&self, request: TailRequest) -> ServerResult<TailResponse> {
        let from = request.from.unwrap_or(0);
        let to = match request.to {
            Some(0) => {
                return Err(ServerError::InvalidRequest("invalid to value".into()));
            }
            Some(to) => to,
            None => u64::MAX,
        };
        if from > to {
            return Err(ServerError::InvalidRequest(format!(
                "invalid from/to values: {from} > {to}"
            )));
        }

        let engine = self.engine();
        engine.collections(&request.database).map_err(ReplicationError::from)?;
        let mut window = TailWindow::new(request.database.clone())
            .with_range(Tick::new(from), Tick::new(to))
            .with_byte_budget(self.context.config.tail_budget(request.chunk_size))
            .with_include_system(request.include_system.unwrap_or(true));
        if let Some(name) = &request.collection {
            let info = engine
                .collection(&request.database, name)
                .map_err(ReplicationError::from)?
                .ok_or_else(|| {
                    ReplicationError::not_found(format!("collection {}/{name}", request.database))
                })?;
            window = window.with_collection(info.id);
        }

        let batch = LogTailer::new(engine, self.context.config.replication.tail_read_batch)
            .tail(&window)?;
        if !batch.markers.is_empty() {
            let server_id = request.server_id.as_deref().unwrap_or(ANONYMOUS_FOLLOWER);
            self.context.clients.record(server_id, batch.last_included);
        }
        Ok(batch.into_response())
    }

    /// Handles an open-transactions request.
    pub fn handle_open_transactions(&self) -> OpenTransactionsResponse {
        LogTailer::new(self.engine(), 1).open_transactions()
    }

    /// Handles a dump request.
    pub fn handle_dump(&self, request: DumpRequest) -> ServerResult<DumpResponse> {
        let budget = self.context.config.dump_budget(request.chunk_size);
        Ok(self
            .context
            .registry
            .with_session(SessionId::new(request.session_id), |session| {
                dump(session, &request.collection, budget)
            })?)
    }

    /// Handles a create-barrier request.
    pub fn handle_create_barrier(&self) -> BarrierCreated {
        BarrierCreated {
            id: self.context.next_barrier.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Handles extend-barrier and delete-barrier requests. Snapshots pin
    /// what barriers would, so there is nothing to hold.
    pub fn handle_touch_barrier(&self, id: u64) {
        tracing::debug!(barrier = id, "barrier request acknowledged");
    }

    /// Handles a list-barriers request.
    pub fn handle_list_barriers(&self) -> Vec<u64> {
        Vec::new()
    }
}

fn ttl(seconds: Option<u64>) -> Option<Duration> {
    seconds.map(Duration::from_secs)
}
