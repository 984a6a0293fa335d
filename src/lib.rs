pub mod auth;
pub mod booking;
pub mod config;
pub mod db;
pub mod mail;
pub mod session;
pub mod validation;
pub mod web;

pub use db::DbPool;

use config::Config;
use mail::MailQueue;
use session::SessionStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mail: MailQueue,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, mail: MailQueue) -> Self {
        let sessions = SessionStore::new(db.clone(), &config.session);
        Self {
            config,
            db,
            mail,
            sessions,
        }
    }
}
