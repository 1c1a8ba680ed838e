//! Liveness endpoint for container orchestration.

use crate::types::Data;
use axum::{Json, Router, extract::State, routing::get};
use log::{debug, info};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;

const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
}

impl MemoryUsage {
    fn new(used: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            used,
            total,
            percentage,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime: u64,
    pub memory: MemoryUsage,
    pub active_queues: usize,
    pub timestamp: i64,
}

/// Resident set size in bytes from the contents of `/proc/self/statm`.
fn parse_statm(statm: &str) -> Option<u64> {
    let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(pages * PAGE_SIZE)
}

/// `MemTotal` in bytes from the contents of `/proc/meminfo`.
fn parse_meminfo(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

async fn read_memory() -> MemoryUsage {
    let used = tokio::fs::read_to_string("/proc/self/statm")
        .await
        .ok()
        .and_then(|s| parse_statm(&s))
        .unwrap_or(0);
    let total = tokio::fs::read_to_string("/proc/meminfo")
        .await
        .ok()
        .and_then(|s| parse_meminfo(&s))
        .unwrap_or(0);
    MemoryUsage::new(used, total)
}

async fn health(State(data): State<Data>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy",
        uptime: data.started_at.elapsed().as_secs(),
        memory: read_memory().await,
        active_queues: data.queues.len(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

pub fn router(data: Data) -> Router {
    Router::new().route("/health", get(health)).with_state(data)
}

/// Serves `/health` until the process exits.
pub async fn serve(data: Data) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, data.config.health_port).into();
    let listener = TcpListener::bind(addr).await?;
    info!("Health check server listening on {}", addr);

    axum::serve(listener, router(data)).await?;
    debug!("Health check server stopped");
    Ok(())
}
