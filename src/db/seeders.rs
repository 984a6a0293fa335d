//! Database seeders for built-in data

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use super::{Room, RoomInput, User};
use crate::auth::hash_password;

/// Access level granted to the seeded administrator
const ADMIN_ACCESS_LEVEL: i64 = 3;

/// Seed the default rooms when the catalog is empty
pub async fn seed_rooms(pool: &SqlitePool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rooms")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    info!("Seeding default rooms...");

    let rooms = [
        (
            "General's Quarters",
            "89.00",
            "/static/images/generals-quarters.png",
            "A spacious corner room with a writing desk and a view over the harbour.",
        ),
        (
            "Major's Suite",
            "120.00",
            "/static/images/majors-suite.png",
            "A two-room suite with a private balcony, sitting area and king-size bed.",
        ),
    ];

    for (name, price, image, description) in rooms {
        Room::insert(
            pool,
            &RoomInput {
                room_name: name.to_string(),
                price: price.to_string(),
                image_src: image.to_string(),
                description: description.to_string(),
            },
        )
        .await?;
    }

    Ok(())
}

/// Create the configured admin account if no user has that email yet
pub async fn ensure_admin_user(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
) -> Result<()> {
    if User::find_by_email(pool, email).await?.is_some() {
        return Ok(());
    }

    let hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    User::insert(pool, name, email, &hash, ADMIN_ACCESS_LEVEL)
        .await
        .context("Failed to create admin user")?;

    info!(email = %email, "Created admin user");
    Ok(())
}
