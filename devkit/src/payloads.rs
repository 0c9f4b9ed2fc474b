/*!
Builders for the fleet's wire payloads

Status announcements are JSON objects, rate updates are bare decimal
integers in UTF-8 text.
*/

use serde_json::json;

/// Status payload as another node would publish it.
pub fn status(client_id: &str, ip: &str, rate_ms: u32) -> Vec<u8> {
    json!({
        "client_id": client_id,
        "uptime": 0,
        "ip": ip,
        "rate": rate_ms,
        "ts": chrono::Utc::now().to_rfc3339(),
        "rssi": null,
        "stats": {
            "free_ram": 1_048_576,
            "storage_id": "sda",
            "cpu_freq": 1_800,
        },
        "system": {
            "sysname": "linux",
            "release": "6.1.0",
            "version": "#1 SMP",
            "machine": "x86_64",
            "hostname": client_id,
            "uniqueId": "000000000000",
        },
    })
    .to_string()
    .into_bytes()
}

/// Rate-update payload for the control topic.
pub fn rate_update(rate_ms: u32) -> Vec<u8> {
    rate_ms.to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_valid_json() {
        let payload = status("node-7", "10.10.1.26", 2_000);
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["client_id"], "node-7");
        assert_eq!(value["ip"], "10.10.1.26");
        assert_eq!(value["stats"]["storage_id"], "sda");
    }

    #[test]
    fn rate_update_is_bare_decimal_text() {
        assert_eq!(rate_update(10_000), b"10000");
    }
}
