// ==========================================
// 语言学校课时账本 - 配置管理器
// ==========================================
// config_kv 表,只使用 global 作用域
// 未设置或无法解析的值一律回落到默认值,不报错
// ==========================================

use crate::config::ledger_config::LedgerConfig;
use crate::db::{configure_sqlite_connection, SharedConnection};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::error::Error;
use tracing::info;

const GLOBAL_SCOPE: &str = "global";

pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 复用账本的共享连接 (PRAGMA 重复执行无副作用)
    pub fn from_connection(conn: SharedConnection) -> Result<Self, Box<dyn Error>> {
        {
            let guard = conn.lock().map_err(|e| format!("配置连接锁不可用: {}", e))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("配置连接锁不可用: {}", e))?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入或覆盖一个配置项; 已装配的 AppState 需重建后生效
    pub fn update_config(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("配置连接锁不可用: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        info!(key = %key, value = %value, "账本配置已覆写");
        Ok(())
    }

    /// 已覆写配置项的 JSON 快照 (按 key 排序)
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("配置连接锁不可用: {}", e))?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1")?;
        let entries = stmt
            .query_map(params![GLOBAL_SCOPE], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(serde_json::to_string(&entries)?)
    }

    // ===== 补课券 =====

    pub fn get_makeup_validity_days(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::MAKEUP_VALIDITY_DAYS, "30")?;
        Ok(value.parse::<i64>().ok().filter(|d| *d > 0).unwrap_or(30))
    }

    pub fn get_makeup_strict_redeem(&self) -> Result<bool, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::MAKEUP_STRICT_REDEEM, "false")?;
        Ok(matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
    }

    // ===== 考勤 =====

    pub fn get_default_deduction_hours(&self) -> Result<f64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_DEDUCTION_HOURS, "2")?;
        Ok(value
            .parse::<f64>()
            .ok()
            .filter(|h| h.is_finite() && *h >= 0.0)
            .unwrap_or(2.0))
    }

    // ===== 导入 =====

    /// 导入/删除批次大小,收敛到 1..=450
    pub fn get_import_batch_size(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::IMPORT_BATCH_SIZE, "450")?;
        let size = value.parse::<usize>().unwrap_or(450);
        Ok(LedgerConfig::clamp_batch_size(size))
    }

    // ===== 缓存 / 建议 =====

    pub fn get_student_cache_ttl_secs(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::STUDENT_CACHE_TTL_SECS, "300")?;
        Ok(value.parse::<i64>().ok().filter(|s| *s >= 0).unwrap_or(300))
    }

    pub fn get_advisory_concurrency(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::ADVISORY_CONCURRENCY, "4")?;
        Ok(value.parse::<usize>().unwrap_or(4).max(1))
    }

    /// 一次性加载账本运行参数
    pub fn load_ledger_config(&self) -> Result<LedgerConfig, Box<dyn Error>> {
        Ok(LedgerConfig {
            makeup_validity_days: self.get_makeup_validity_days()?,
            default_deduction_hours: self.get_default_deduction_hours()?,
            import_batch_size: self.get_import_batch_size()?,
            student_cache_ttl_secs: self.get_student_cache_ttl_secs()?,
            makeup_strict_redeem: self.get_makeup_strict_redeem()?,
            advisory_concurrency: self.get_advisory_concurrency()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 补课券
    pub const MAKEUP_VALIDITY_DAYS: &str = "makeup_validity_days";
    pub const MAKEUP_STRICT_REDEEM: &str = "makeup_strict_redeem";

    // 考勤
    pub const DEFAULT_DEDUCTION_HOURS: &str = "default_deduction_hours";

    // 导入
    pub const IMPORT_BATCH_SIZE: &str = "import_batch_size";

    // 缓存
    pub const STUDENT_CACHE_TTL_SECS: &str = "student_cache_ttl_secs";

    // 建议生成
    pub const ADVISORY_CONCURRENCY: &str = "advisory_concurrency";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn manager() -> ConfigManager {
        let conn = db::open_in_memory_shared().unwrap();
        ConfigManager::from_connection(conn).unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = manager().load_ledger_config().unwrap();
        assert_eq!(cfg, LedgerConfig::default());
    }

    #[test]
    fn test_overrides_and_snapshot() {
        let mgr = manager();
        mgr.update_config(config_keys::MAKEUP_VALIDITY_DAYS, "14").unwrap();
        mgr.update_config(config_keys::MAKEUP_STRICT_REDEEM, "true").unwrap();
        mgr.update_config(config_keys::IMPORT_BATCH_SIZE, "9999").unwrap();

        let cfg = mgr.load_ledger_config().unwrap();
        assert_eq!(cfg.makeup_validity_days, 14);
        assert!(cfg.makeup_strict_redeem);
        assert_eq!(cfg.import_batch_size, 450);

        let snapshot: std::collections::HashMap<String, String> =
            serde_json::from_str(&mgr.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot.get("makeup_validity_days").map(String::as_str), Some("14"));
    }

    #[test]
    fn test_garbage_values_fall_back() {
        let mgr = manager();
        mgr.update_config(config_keys::DEFAULT_DEDUCTION_HOURS, "-3").unwrap();
        mgr.update_config(config_keys::ADVISORY_CONCURRENCY, "abc").unwrap();
        assert_eq!(mgr.get_default_deduction_hours().unwrap(), 2.0);
        assert_eq!(mgr.get_advisory_concurrency().unwrap(), 4);
    }
}
