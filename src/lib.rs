pub mod db;
pub mod fanout;
pub mod handlers;
pub mod models;
pub mod push;
pub mod registry;
pub mod routes;
pub mod session;

use std::env;
use std::sync::Arc;

use db::Db;
use push::{FcmGateway, PushHandle};
use registry::PresenceRegistry;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/chat.db".to_string());
    rocket_with_db(&db_path)
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, Arc::new(FcmGateway::from_env()))
}

/// Builder with an injectable push gateway (tests record deliveries
/// instead of talking to FCM).
pub fn rocket_with_push(db_path: &str, push: PushHandle) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, push)
}

fn build_rocket(db_path: &str, push: PushHandle) -> rocket::Rocket<rocket::Build> {
    // Ensure data directory exists
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Db::new(db_path);
    let registry = PresenceRegistry::default();

    println!("💬 chat relay ready (db: {db_path})");

    rocket::build()
        .manage(db)
        .manage(registry)
        .manage(push)
        .mount("/", rocket::routes![routes::chat])
}
