// ==========================================
// 语言学校课时账本 - 学员缓存
// ==========================================
// 生命周期: 由 AppState 持有,随进程存在,无全局状态
// 写穿透: 写入方在写闸内 "提交 → 回写提交后的行",缓存按提交顺序更新
// 失效穿透: 不返回余额的写入同样持闸执行,结束后失效
// 读穿透: 读前记录代次,回填时代次已变 (期间有写入/失效) 则放弃回填
// 红线: 缓存只存数据库中读出的行,不在旧值上叠加增量
// ==========================================

use crate::domain::StudentBalance;
use crate::engine::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

/// 写闸分片数 (同一学员总落在同一分片)
const WRITE_GATE_STRIPES: usize = 16;

struct CacheEntry {
    balance: StudentBalance,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    /// 每次写回/失效递增
    generation: u64,
    entries: HashMap<String, CacheEntry>,
}

pub struct StudentCache {
    state: RwLock<CacheState>,
    write_gates: Vec<Mutex<()>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl StudentCache {
    pub fn new(clock: Arc<dyn Clock>, ttl_secs: i64) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            write_gates: (0..WRITE_GATE_STRIPES).map(|_| Mutex::new(())).collect(),
            clock,
            ttl: Duration::seconds(ttl_secs.max(0)),
        }
    }

    /// 读取未过期的缓存
    pub fn get(&self, student_id: &str) -> Option<StudentBalance> {
        let now = self.clock.now();
        let state = self.state.read().ok()?;
        state
            .entries
            .get(student_id)
            .filter(|e| e.expires_at > now)
            .map(|e| e.balance.clone())
    }

    /// 当前代次,读穿透查库前调用
    pub fn generation(&self) -> u64 {
        self.state.read().map(|s| s.generation).unwrap_or(u64::MAX)
    }

    /// 读穿透回填
    ///
    /// 自 `seen` 之后发生过写回或失效时放弃,返回 false
    pub fn fill(&self, balance: StudentBalance, seen: u64) -> bool {
        let expires_at = self.clock.now() + self.ttl;
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        if state.generation != seen {
            debug!(student_id = %balance.student_id, "缓存回填被更新的写入取代");
            return false;
        }
        state.entries.insert(
            balance.student_id.clone(),
            CacheEntry {
                balance,
                expires_at,
            },
        );
        true
    }

    /// 写回提交后的权威值
    pub fn put(&self, balance: StudentBalance) {
        let expires_at = self.clock.now() + self.ttl;
        if let Ok(mut state) = self.state.write() {
            state.generation += 1;
            state.entries.insert(
                balance.student_id.clone(),
                CacheEntry {
                    balance,
                    expires_at,
                },
            );
        }
    }

    pub fn invalidate(&self, student_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.generation += 1;
            if state.entries.remove(student_id).is_some() {
                debug!(student_id = %student_id, "学员缓存失效");
            }
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut state) = self.state.write() {
            state.generation += 1;
            state.entries.clear();
        }
    }

    /// 在该学员的写闸内执行写入,成功后回写 write 返回的提交后余额
    ///
    /// 同一学员的写回顺序与提交顺序一致; 写入失败时缓存不变
    pub fn write_through<T, E, F>(&self, student_id: &str, write: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<(T, StudentBalance), E>,
    {
        let _gates = self.lock_stripes([stripe_of(student_id)]);
        let (value, committed) = write()?;
        self.put(committed);
        Ok(value)
    }

    /// 在相关学员的写闸内执行写入,结束后 (无论成败) 使这些学员失效
    ///
    /// 用于不返回提交后余额的写入 (补课券、考勤批次)
    pub fn invalidate_through<'a, I, T, F>(&self, student_ids: I, write: F) -> T
    where
        I: IntoIterator<Item = &'a str>,
        F: FnOnce() -> T,
    {
        let ids: Vec<&str> = student_ids.into_iter().collect();
        let _gates = self.lock_stripes(ids.iter().map(|id| stripe_of(id)));
        let value = write();
        for id in ids {
            self.invalidate(id);
        }
        value
    }

    /// 持有全部写闸执行整表写入 (导入/清理),结束后清空缓存
    pub fn invalidate_all_through<T, F>(&self, write: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _gates = self.lock_stripes(0..WRITE_GATE_STRIPES);
        let value = write();
        self.invalidate_all();
        value
    }

    /// 按分片序号升序加锁,多闸同时持有时不会互相等待成环
    fn lock_stripes<I>(&self, stripes: I) -> Vec<MutexGuard<'_, ()>>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut stripes: Vec<usize> = stripes.into_iter().collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes
            .into_iter()
            .map(|i| {
                self.write_gates[i]
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn stripe_of(student_id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    student_id.hash(&mut hasher);
    (hasher.finish() as usize) % WRITE_GATE_STRIPES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedClock;
    use chrono::TimeZone;

    fn setup() -> (Arc<FixedClock>, StudentCache) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
        ));
        let cache = StudentCache::new(clock.clone(), 300);
        (clock, cache)
    }

    fn balance(clock: &FixedClock, credits: f64) -> StudentBalance {
        StudentBalance::new_enrollment("s1", "Anny", credits, clock.now())
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let (clock, cache) = setup();
        cache.put(balance(&clock, 10.0));
        assert!(cache.get("s1").is_some());

        clock.advance(Duration::seconds(301));
        assert!(cache.get("s1").is_none());
    }

    #[test]
    fn test_fill_loses_to_newer_write() {
        let (clock, cache) = setup();

        // 读者查库拿到旧值,期间写入方已提交并写回
        let seen = cache.generation();
        let stale = balance(&clock, 10.0);
        cache.put(balance(&clock, 8.0));

        assert!(!cache.fill(stale, seen));
        assert_eq!(cache.get("s1").unwrap().credits, 8.0);
    }

    #[test]
    fn test_fill_after_invalidate_is_rejected() {
        let (clock, cache) = setup();
        let seen = cache.generation();
        cache.invalidate("s1");
        assert!(!cache.fill(balance(&clock, 10.0), seen));
        assert!(cache.get("s1").is_none());

        let seen = cache.generation();
        assert!(cache.fill(balance(&clock, 10.0), seen));
        assert_eq!(cache.get("s1").unwrap().credits, 10.0);
    }

    #[test]
    fn test_write_through_puts_committed_row_only_on_success() {
        let (clock, cache) = setup();
        cache.put(balance(&clock, 10.0));

        let failed: Result<(), &str> = cache.write_through("s1", || Err("store unavailable"));
        assert!(failed.is_err());
        assert_eq!(cache.get("s1").unwrap().credits, 10.0);

        let committed = balance(&clock, 7.0);
        let value: Result<u8, &str> = cache.write_through("s1", || Ok((1, committed)));
        assert_eq!(value, Ok(1));
        assert_eq!(cache.get("s1").unwrap().credits, 7.0);
    }

    #[test]
    fn test_invalidate_through_drops_entries_even_on_error() {
        let (clock, cache) = setup();
        cache.put(balance(&clock, 10.0));
        cache.put(StudentBalance::new_enrollment("s2", "Bow", 10.0, clock.now()));
        cache.put(StudentBalance::new_enrollment("s3", "Cyan", 10.0, clock.now()));

        let result: Result<(), &str> = cache.invalidate_through(["s1", "s2", "s1"], || Err("locked"));
        assert!(result.is_err());
        assert!(cache.get("s1").is_none());
        assert!(cache.get("s2").is_none());
        assert!(cache.get("s3").is_some());

        let rows = cache.invalidate_all_through(|| 3usize);
        assert_eq!(rows, 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let (clock, cache) = setup();
        cache.put(balance(&clock, 10.0));
        cache.put(StudentBalance::new_enrollment("s2", "Bow", 10.0, clock.now()));
        cache.invalidate("s1");
        assert!(cache.get("s1").is_none());
        assert_eq!(cache.len(), 1);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
