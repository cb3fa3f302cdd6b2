// Node bootstrap and wiring
//
// The CoordinationContext is the explicit dependency bundle handed to every
// worker: peer table, clocks, replication queue and repositories. It is
// built first, so repositories and the replication queue exist before any
// service listener accepts traffic. Shutdown is cooperative: clearing the
// running flag stops every worker at its next suspension point; pending
// periodic work is discarded.

use crate::balancer::{BackendRegistry, BalancerSyncHandler, RequestRouter};
use crate::clock::{BerkeleySync, LogicalClock, PhysicalClock};
use crate::cluster::peer::{is_balancer_id, PeerEntry, PeerTable};
use crate::cluster::{BullyElection, Discovery};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::replication::queue::spawn_drainer;
use crate::replication::{ReplicationApplier, ReplicationQueue};
use crate::repository::{MessageRepository, PostRepository, UserRepository};
use crate::service::{
    FollowHandler, MessageHandler, PostHandler, ServiceWorker, UserHandler,
};
use crate::sync::message::{SyncBody, SyncReply};
use crate::sync::server::{SyncHandler, SyncServer};
use crate::sync::transport::SyncTransport;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// Shared dependencies, injected at construction instead of living in a
// process-wide registry.
pub struct CoordinationContext {
    pub server_id: String,
    pub peers: Arc<PeerTable>,
    pub logical: Arc<LogicalClock>,
    pub physical: Arc<PhysicalClock>,
    pub queue: Arc<ReplicationQueue>,
    pub users: Arc<UserRepository>,
    pub posts: Arc<PostRepository>,
    pub messages: Arc<MessageRepository>,
}

impl CoordinationContext {
    pub fn from_config(config: &NodeConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_directory)?;
        let users = Arc::new(UserRepository::open(
            config.repo_directory(&config.user_data_directory),
        )?);
        let posts = Arc::new(PostRepository::open(
            config.repo_directory(&config.post_data_directory),
        )?);
        let messages = Arc::new(MessageRepository::open(
            config.repo_directory(&config.message_data_directory),
        )?);

        let peers = Arc::new(PeerTable::new(&config.server_id));
        for seed in &config.seed_servers {
            peers.upsert(PeerEntry::new(&seed.node_id, &seed.host, seed.sync_port));
        }
        let mut own = PeerEntry::new(&config.server_id, &config.server_address, config.sync_port);
        own.service_port = config.server_port;
        peers.upsert(own);

        Ok(Arc::new(Self {
            server_id: config.server_id.clone(),
            peers,
            logical: Arc::new(LogicalClock::new()),
            physical: Arc::new(PhysicalClock::with_state_dir(&config.data_directory)),
            queue: Arc::new(ReplicationQueue::new()),
            users,
            posts,
            messages,
        }))
    }

    /// Context without any cluster wiring; used for embedding and tests.
    pub fn standalone(server_id: impl Into<String>, data_dir: impl AsRef<Path>) -> Result<Arc<Self>> {
        let config = NodeConfig {
            server_id: server_id.into(),
            data_directory: data_dir.as_ref().to_path_buf(),
            ..NodeConfig::default()
        };
        Self::from_config(&config)
    }
}

// Full control-plane responder for the backend role.
struct BackendSyncHandler {
    discovery: Arc<Discovery>,
    election: Arc<BullyElection>,
    berkeley: Arc<BerkeleySync>,
    applier: Arc<ReplicationApplier>,
}

#[async_trait]
impl SyncHandler for BackendSyncHandler {
    async fn handle(&self, body: SyncBody) -> SyncReply {
        match body {
            SyncBody::ServerPing { node_id } => self.discovery.handle_ping(&node_id),
            SyncBody::ServerAnnouncement {
                node_id,
                address,
                service_port,
                sync_address,
            } => self
                .discovery
                .handle_announcement(node_id, address, service_port, sync_address),
            SyncBody::IsCoordinatorRequest { .. } => self.election.handle_is_coordinator_request(),
            SyncBody::CoordinatorPing { node_id } => self.election.handle_coordinator_ping(&node_id),
            SyncBody::CoordinatorHeartbeat { coordinator_id } => {
                self.election.handle_coordinator(coordinator_id)
            }
            SyncBody::Election { from_server } => self.election.handle_election(from_server),
            SyncBody::ElectionResponse { from_server } => {
                self.election.handle_election_response(from_server)
            }
            SyncBody::Coordinator { coordinator_id } => {
                self.election.handle_coordinator(coordinator_id)
            }
            SyncBody::TimeRequest {
                coordinator,
                timestamp,
            } => self.berkeley.handle_time_request(coordinator, timestamp),
            SyncBody::TimeResponse {
                server_id,
                time_difference,
                ..
            } => self.berkeley.handle_time_response(server_id, time_difference),
            SyncBody::ClockAdjustment {
                coordinator,
                adjustment,
            } => self.berkeley.handle_clock_adjustment(coordinator, adjustment),
            SyncBody::DataReplication {
                source_server_id,
                event_type,
                entity_id,
                data,
                ..
            } => match self
                .applier
                .apply(&source_server_id, event_type, &entity_id, data)
            {
                Ok(()) => SyncReply::ok(),
                Err(e) => {
                    tracing::error!("failed to apply {:?} for {}: {}", event_type, entity_id, e);
                    SyncReply::failure(e.to_string())
                }
            },
        }
    }
}

// A data node: repositories, the four services and the full coordination
// stack.
pub struct BackendNode {
    ctx: Arc<CoordinationContext>,
    election: Arc<BullyElection>,
    discovery: Arc<Discovery>,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    sync_port: u16,
    posts_port: u16,
    messages_port: u16,
    follow_port: u16,
    users_port: u16,
}

impl BackendNode {
    pub async fn start(config: NodeConfig) -> Result<Self> {
        // Repositories and the replication queue must exist before any
        // listener accepts traffic.
        let ctx = CoordinationContext::from_config(&config)?;
        let running = Arc::new(AtomicBool::new(true));

        let sync_server = SyncServer::bind(&config.server_address, config.sync_port).await?;
        let sync_port = sync_server.port();
        let mut own = PeerEntry::new(&config.server_id, &config.server_address, sync_port);
        own.service_port = config.server_port;
        ctx.peers.upsert(own);

        let transport = Arc::new(
            SyncTransport::new(
                &config.server_id,
                Arc::clone(&ctx.peers),
                Arc::clone(&ctx.logical),
            )
            .with_timeouts(
                config.retry_suppression_window,
                config.send_timeout,
                config.request_timeout,
            ),
        );

        let election = Arc::new(BullyElection::new(
            &config.server_id,
            Arc::clone(&ctx.peers),
            Arc::clone(&transport),
            config.election_response_window,
        ));
        let berkeley = Arc::new(BerkeleySync::new(
            &config.server_id,
            Arc::clone(&transport),
            Arc::clone(&ctx.physical),
            Arc::clone(&election),
            config.berkeley_collect_window,
        ));
        let discovery = Arc::new(Discovery::new(
            &config.server_id,
            &config.server_address,
            config.server_port,
            sync_port,
            Arc::clone(&ctx.peers),
            Arc::clone(&transport),
        ));
        let applier = Arc::new(ReplicationApplier::new(
            Arc::clone(&ctx.users),
            Arc::clone(&ctx.posts),
            Arc::clone(&ctx.messages),
        ));

        let handler: Arc<dyn SyncHandler> = Arc::new(BackendSyncHandler {
            discovery: Arc::clone(&discovery),
            election: Arc::clone(&election),
            berkeley: Arc::clone(&berkeley),
            applier,
        });

        let mut tasks = Vec::new();
        tasks.push(sync_server.spawn(
            Arc::clone(&ctx.logical),
            handler,
            Arc::clone(&running),
        ));
        tasks.push(spawn_drainer(
            Arc::clone(&ctx.queue),
            Arc::clone(&transport),
            Arc::clone(&running),
            config.replication_idle_sleep,
        ));

        let posts_worker = ServiceWorker::bind(
            &config.server_address,
            config.posts_port(),
            Arc::new(PostHandler::new(Arc::clone(&ctx))),
        )
        .await?;
        let messages_worker = ServiceWorker::bind(
            &config.server_address,
            config.messages_port(),
            Arc::new(MessageHandler::new(Arc::clone(&ctx))),
        )
        .await?;
        let follow_worker = ServiceWorker::bind(
            &config.server_address,
            config.follow_port(),
            Arc::new(FollowHandler::new(Arc::clone(&ctx))),
        )
        .await?;
        let users_worker = ServiceWorker::bind(
            &config.server_address,
            config.users_port(),
            Arc::new(UserHandler::new(Arc::clone(&ctx))),
        )
        .await?;

        let posts_port = posts_worker.port();
        let messages_port = messages_worker.port();
        let follow_port = follow_worker.port();
        let users_port = users_worker.port();
        tasks.push(posts_worker.spawn(Arc::clone(&running)));
        tasks.push(messages_worker.spawn(Arc::clone(&running)));
        tasks.push(follow_worker.spawn(Arc::clone(&running)));
        tasks.push(users_worker.spawn(Arc::clone(&running)));

        tasks.push(discovery.spawn_ping_task(config.ping_interval, Arc::clone(&running)));
        tasks.push(discovery.spawn_announce_task(config.announce_delay, Arc::clone(&running)));
        tasks.push(election.spawn_check_task(config.coordinator_check_interval, Arc::clone(&running)));
        tasks.push(berkeley.spawn_sync_task(config.sync_interval, Arc::clone(&running)));

        tracing::info!(
            "backend {} up: sync {} services {}/{}/{}/{}",
            config.server_id,
            sync_port,
            posts_port,
            messages_port,
            follow_port,
            users_port
        );

        Ok(Self {
            ctx,
            election,
            discovery,
            running,
            tasks,
            sync_port,
            posts_port,
            messages_port,
            follow_port,
            users_port,
        })
    }

    pub fn context(&self) -> &Arc<CoordinationContext> {
        &self.ctx
    }

    pub fn election(&self) -> &Arc<BullyElection> {
        &self.election
    }

    /// Announce immediately instead of waiting for the startup delay.
    pub fn announce_now(&self) {
        self.discovery.announce_to_all();
    }

    pub fn sync_port(&self) -> u16 {
        self.sync_port
    }

    pub fn posts_port(&self) -> u16 {
        self.posts_port
    }

    pub fn messages_port(&self) -> u16 {
        self.messages_port
    }

    pub fn follow_port(&self) -> u16 {
        self.follow_port
    }

    pub fn users_port(&self) -> u16 {
        self.users_port
    }

    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = tokio::time::timeout(
            SHUTDOWN_GRACE,
            futures::future::join_all(self.tasks),
        )
        .await;
        tracing::info!("backend {} stopped", self.ctx.server_id);
    }
}

// A balancer node: request router plus the reduced sync responder. No
// repositories, no election, no clock sync.
pub struct BalancerNode {
    server_id: String,
    peers: Arc<PeerTable>,
    registry: Arc<BackendRegistry>,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    sync_port: u16,
    router_port: u16,
}

impl BalancerNode {
    pub async fn start(config: NodeConfig) -> Result<Self> {
        if !is_balancer_id(&config.server_id) {
            tracing::warn!(
                "balancer id '{}' lacks the balancer prefix; data nodes will replicate toward it",
                config.server_id
            );
        }

        let running = Arc::new(AtomicBool::new(true));
        let logical = Arc::new(LogicalClock::new());
        let peers = Arc::new(PeerTable::new(&config.server_id));
        for seed in &config.seed_servers {
            peers.upsert(PeerEntry::new(&seed.node_id, &seed.host, seed.sync_port));
        }

        let sync_server = SyncServer::bind(&config.server_address, config.sync_port).await?;
        let sync_port = sync_server.port();
        let mut own = PeerEntry::new(&config.server_id, &config.server_address, sync_port);
        own.service_port = config.balancer_port;
        peers.upsert(own);

        let transport = Arc::new(
            SyncTransport::new(&config.server_id, Arc::clone(&peers), Arc::clone(&logical))
                .with_timeouts(
                    config.retry_suppression_window,
                    config.send_timeout,
                    config.request_timeout,
                ),
        );
        let registry = Arc::new(BackendRegistry::new(Arc::clone(&peers)));

        let mut tasks = Vec::new();
        let handler: Arc<dyn SyncHandler> = Arc::new(BalancerSyncHandler::new(
            &config.server_id,
            Arc::clone(&peers),
        ));
        tasks.push(sync_server.spawn(Arc::clone(&logical), handler, Arc::clone(&running)));

        let router = RequestRouter::bind(
            &config.server_address,
            config.balancer_port,
            Arc::clone(&registry),
        )
        .await?;
        let router_port = router.port();
        tasks.push(router.spawn(Arc::clone(&running)));

        let discovery = Arc::new(Discovery::new(
            &config.server_id,
            &config.server_address,
            config.balancer_port,
            sync_port,
            Arc::clone(&peers),
            transport,
        ));
        tasks.push(discovery.spawn_ping_task(config.ping_interval, Arc::clone(&running)));

        tracing::info!(
            "balancer {} up: router {} sync {}",
            config.server_id,
            router_port,
            sync_port
        );

        Ok(Self {
            server_id: config.server_id.clone(),
            peers,
            registry,
            running,
            tasks,
            sync_port,
            router_port,
        })
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn sync_port(&self) -> u16 {
        self.sync_port
    }

    pub fn router_port(&self) -> u16 {
        self.router_port
    }

    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = tokio::time::timeout(
            SHUTDOWN_GRACE,
            futures::future::join_all(self.tasks),
        )
        .await;
        tracing::info!("balancer {} stopped", self.server_id);
    }
}
