use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;

use generation::{GenerationClient, GenerationLocks, TextExtractor};
use mailer::Mailer;

pub mod config;
pub mod error;
pub mod generation;
pub mod mailer;
pub mod middleware;
pub mod ownership;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub generator: GenerationClient,
    pub mailer: Mailer,
    pub extractor: Arc<dyn TextExtractor>,
    pub generation_locks: GenerationLocks,
}
