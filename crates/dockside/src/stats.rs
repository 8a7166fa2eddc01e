//! Container resource statistics and their human-readable form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dockside_stream::{JsonStream, SharedWriter};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::Result;

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// One stats snapshot as reported by `GET /containers/{id}/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub read: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preread: Option<DateTime<Utc>>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pids_stats: PidsStats,
    #[serde(default)]
    pub blkio_stats: BlkioStats,
    #[serde(default)]
    pub num_procs: u32,
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidsStats {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlkioStats {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub io_service_bytes_recursive: Vec<BlkioEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlkioEntry {
    #[serde(default)]
    pub major: u64,
    #[serde(default)]
    pub minor: u64,
    /// `Read`, `Write`, `Sync`, ... Case varies between cgroup versions.
    pub op: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: u64,
    #[serde(default)]
    pub online_cpus: u32,
    #[serde(default)]
    pub throttling_data: ThrottlingData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    #[serde(default)]
    pub usage_in_kernelmode: u64,
    #[serde(default)]
    pub usage_in_usermode: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlingData {
    #[serde(default)]
    pub periods: u64,
    #[serde(default)]
    pub throttled_periods: u64,
    #[serde(default)]
    pub throttled_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub max_usage: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub stats: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub rx_dropped: u64,
    #[serde(default)]
    pub rx_errors: u64,
    #[serde(default)]
    pub rx_packets: u64,
    #[serde(default)]
    pub tx_bytes: u64,
    #[serde(default)]
    pub tx_dropped: u64,
    #[serde(default)]
    pub tx_errors: u64,
    #[serde(default)]
    pub tx_packets: u64,
}

impl ContainerStats {
    /// CPU usage since the previous snapshot, e.g. `12.50%`.
    ///
    /// `(Δcontainer / Δsystem) × online CPUs × 100`; a result that is not
    /// finite (first snapshot, idle system) reads `0.00%`.
    pub fn cpu_percent(&self) -> String {
        let total = self.cpu_stats.cpu_usage.total_usage as f64
            - self.precpu_stats.cpu_usage.total_usage as f64;
        let system =
            self.cpu_stats.system_cpu_usage as f64 - self.precpu_stats.system_cpu_usage as f64;
        let percent = total / system * f64::from(self.cpu_stats.online_cpus) * 100.0;

        if percent.is_finite() {
            format!("{percent:.2}%")
        } else {
            "0.00%".to_string()
        }
    }

    /// `usage / limit`.
    pub fn memory_usage(&self) -> String {
        format!(
            "{} / {}",
            human_bytes(self.memory_stats.usage),
            human_bytes(self.memory_stats.limit)
        )
    }

    /// `received / transmitted`, summed over all interfaces.
    pub fn network_io(&self) -> String {
        let (rx, tx) = self
            .networks
            .values()
            .fold((0u64, 0u64), |(rx, tx), net| {
                (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
            });
        format!("{} / {}", human_bytes(rx), human_bytes(tx))
    }

    /// `read / written`, summed over all block devices.
    pub fn disk_io(&self) -> String {
        let mut read = 0u64;
        let mut written = 0u64;
        for entry in &self.blkio_stats.io_service_bytes_recursive {
            if entry.op.eq_ignore_ascii_case("read") {
                read = read.saturating_add(entry.value);
            } else if entry.op.eq_ignore_ascii_case("write") {
                written = written.saturating_add(entry.value);
            }
        }
        format!("{} / {}", human_bytes(read), human_bytes(written))
    }

    pub fn formatted(&self) -> FormattedStats {
        FormattedStats {
            cpu_usage: self.cpu_percent(),
            memory_usage: self.memory_usage(),
            network_io: self.network_io(),
            disk_io: self.disk_io(),
        }
    }
}

/// Display form of a snapshot, written one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedStats {
    #[serde(rename = "cpuUsage")]
    pub cpu_usage: String,
    #[serde(rename = "memoryUsage")]
    pub memory_usage: String,
    #[serde(rename = "networkIO")]
    pub network_io: String,
    #[serde(rename = "diskIO")]
    pub disk_io: String,
}

/// Formats a byte count with a 1024 base: `512 B`, `1.50 KB`, `2.00 GB`.
pub fn human_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} {}", bytes, UNITS[0]);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Decodes snapshots from `source` and writes each formatted one to `sink`
/// followed by a newline. Returns the number of snapshots written.
pub async fn write_formatted<R>(source: R, sink: &SharedWriter) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut snapshots = JsonStream::<_, ContainerStats>::new(source);
    let mut written = 0u64;

    while let Some(stats) = snapshots.next().await? {
        let mut line = serde_json::to_vec(&stats.formatted())?;
        line.push(b'\n');

        let mut sink = sink.lock().await;
        sink.write_all(&line).await?;
        sink.flush().await?;
        written += 1;
    }

    Ok(written)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockside_stream::shared_writer;

    fn sample() -> ContainerStats {
        serde_json::from_str(
            r#"{
                "read": "2024-05-01T10:00:01.000000000Z",
                "preread": "2024-05-01T10:00:00.000000000Z",
                "cpu_stats": {
                    "cpu_usage": {"total_usage": 100000000},
                    "system_cpu_usage": 1000000000,
                    "online_cpus": 4
                },
                "precpu_stats": {"cpu_usage": {"total_usage": 0}, "system_cpu_usage": 0},
                "memory_stats": {"usage": 1048576, "limit": 2147483648},
                "networks": {
                    "eth0": {"rx_bytes": 1024, "tx_bytes": 512},
                    "eth1": {"rx_bytes": 1024, "tx_bytes": 0}
                },
                "blkio_stats": {"io_service_bytes_recursive": [
                    {"major": 8, "minor": 0, "op": "Read", "value": 1536},
                    {"major": 8, "minor": 0, "op": "Write", "value": 100},
                    {"major": 8, "minor": 16, "op": "read", "value": 512}
                ]}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1024), "1.00 KB");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
        assert_eq!(human_bytes(u64::MAX), "16.00 EB");
    }

    #[test]
    fn test_formatted_fields() {
        let stats = sample();
        assert_eq!(stats.cpu_percent(), "40.00%");
        assert_eq!(stats.memory_usage(), "1.00 MB / 2.00 GB");
        assert_eq!(stats.network_io(), "2.00 KB / 512 B");
        assert_eq!(stats.disk_io(), "2.00 KB / 100 B");
        assert!(stats.read.is_some());
    }

    #[test]
    fn test_cpu_percent_without_baseline() {
        let stats = ContainerStats::default();
        assert_eq!(stats.cpu_percent(), "0.00%");

        let mut stats = sample();
        stats.cpu_stats.system_cpu_usage = 0;
        assert_eq!(stats.cpu_percent(), "0.00%");
    }

    #[test]
    fn test_null_blkio_entries() {
        let body = r#"{"blkio_stats": {"io_service_bytes_recursive": null}}"#;
        let stats: ContainerStats = serde_json::from_str(body).unwrap();
        assert_eq!(stats.disk_io(), "0 B / 0 B");
    }

    #[tokio::test]
    async fn test_write_formatted_emits_one_line_per_snapshot() {
        let (sink_side, mut read_side) = tokio::io::duplex(4096);
        let sink = shared_writer(sink_side);

        let one = serde_json::to_string(&sample()).unwrap();
        let input = format!("{one}\n{one}\n");

        let written = write_formatted(input.as_bytes(), &sink).await.unwrap();
        assert_eq!(written, 2);
        drop(sink);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut read_side, &mut out)
            .await
            .unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"cpuUsage":"40.00%","memoryUsage":"1.00 MB / 2.00 GB","networkIO":"2.00 KB / 512 B","diskIO":"2.00 KB / 100 B"}"#
        );
    }
}
