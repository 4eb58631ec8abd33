// ==========================================
// 语言学校课时账本 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态 (仓储、引擎、缓存)
// 写穿透: 扣减/购课/学员属性 → 写闸内提交并回写提交后的行
// 失效穿透: 补课券/考勤/导入 → 写闸内提交后失效
// ==========================================

use std::path::Path;
use std::sync::Arc;

use crate::advisory::{AdvisoryReport, AdvisoryService, RuleBasedAdvisor, StudentAdvisor};
use crate::app::student_cache::StudentCache;
use crate::config::{ConfigManager, LedgerConfig};
use crate::db::{self, SharedConnection};
use crate::domain::{
    AssignedClass, AttendanceSession, CreditPackage, FifoDeduction, MakeupCredit,
    MembershipStatus, ScholarshipTier, SessionSummary, StudentBalance, StudentSnapshot,
    StudentStatus,
};
use crate::engine::{
    AttendanceProcessor, Clock, LedgerEngine, LedgerResult, MakeupLifecycle, SystemClock,
};
use crate::importer::{ImportResult, ImportSummary, StudentImporter, SweepSummary};
use crate::repository::{
    AttendanceLogRepository, BalanceStore, BalanceUpdate, MakeupCreditRepository,
    PackageRepository, ScheduleRepository, StudentRepository,
};

/// 建议分析使用的最近出勤窗口
const RECENT_ATTENDANCE_WINDOW: usize = 5;

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub conn: SharedConnection,
    pub config_manager: Arc<ConfigManager>,
    pub config: LedgerConfig,
    pub clock: Arc<dyn Clock>,

    // ===== 仓储 =====
    pub student_repo: Arc<StudentRepository>,
    pub package_repo: Arc<PackageRepository>,
    pub makeup_repo: Arc<MakeupCreditRepository>,
    pub schedule_repo: Arc<ScheduleRepository>,
    pub attendance_log_repo: Arc<AttendanceLogRepository>,

    // ===== 引擎 =====
    pub ledger: Arc<LedgerEngine>,
    pub makeups: Arc<MakeupLifecycle>,
    pub attendance: Arc<AttendanceProcessor>,
    pub importer: Arc<StudentImporter>,
    pub advisory: Arc<AdvisoryService>,

    pub cache: Arc<StudentCache>,
}

impl AppState {
    /// 打开数据库并初始化全部组件
    ///
    /// # 返回
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState,数据库路径: {}", db_path);

        let conn = db::open_shared(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let mut state = Self::with_connection(conn, Arc::new(SystemClock))?;
        state.db_path = db_path;
        Ok(state)
    }

    /// 基于已有连接与时钟装配 (测试注入 FixedClock)
    pub fn with_connection(conn: SharedConnection, clock: Arc<dyn Clock>) -> Result<Self, String> {
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config = config_manager
            .load_ledger_config()
            .map_err(|e| format!("配置加载失败: {}", e))?;

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let student_repo = Arc::new(StudentRepository::new(conn.clone()));
        let package_repo = Arc::new(PackageRepository::new(conn.clone()));
        let makeup_repo = Arc::new(MakeupCreditRepository::new(conn.clone()));
        let schedule_repo = Arc::new(ScheduleRepository::new(conn.clone()));
        let attendance_log_repo = Arc::new(AttendanceLogRepository::new(conn.clone()));
        let store: Arc<dyn BalanceStore> = student_repo.clone();

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let ledger = Arc::new(LedgerEngine::new(
            store.clone(),
            package_repo.clone(),
            clock.clone(),
        ));
        let makeups = Arc::new(MakeupLifecycle::new(
            store.clone(),
            makeup_repo.clone(),
            clock.clone(),
            &config,
        ));
        let attendance = Arc::new(AttendanceProcessor::new(
            ledger.clone(),
            makeups.clone(),
            store,
            attendance_log_repo.clone(),
        ));
        let importer = Arc::new(StudentImporter::new(
            student_repo.clone(),
            clock.clone(),
            config.import_batch_size,
        ));
        let advisor: Arc<dyn StudentAdvisor> = Arc::new(RuleBasedAdvisor);
        let advisory = Arc::new(AdvisoryService::new(advisor, config.advisory_concurrency));
        let cache = Arc::new(StudentCache::new(clock.clone(), config.student_cache_ttl_secs));

        tracing::info!(
            makeup_validity_days = config.makeup_validity_days,
            import_batch_size = config.import_batch_size,
            strict_redeem = config.makeup_strict_redeem,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path: String::new(),
            conn,
            config_manager,
            config,
            clock,
            student_repo,
            package_repo,
            makeup_repo,
            schedule_repo,
            attendance_log_repo,
            ledger,
            makeups,
            attendance,
            importer,
            advisory,
            cache,
        })
    }

    // ==========================================
    // 学员余额 (缓存读)
    // ==========================================

    pub fn get_student(&self, student_id: &str) -> LedgerResult<StudentBalance> {
        if let Some(hit) = self.cache.get(student_id) {
            return Ok(hit);
        }
        // 代次须在查库前取得
        let seen = self.cache.generation();
        let balance = self.student_repo.get_balance(student_id)?;
        self.cache.fill(balance.clone(), seen);
        Ok(balance)
    }

    pub fn create_student(&self, student: &StudentBalance) -> LedgerResult<()> {
        self.cache.write_through(&student.student_id, || -> LedgerResult<_> {
            self.student_repo.insert(student)?;
            let committed = self.student_repo.get_balance(&student.student_id)?;
            Ok(((), committed))
        })
    }

    pub fn set_tier(&self, student_id: &str, tier: ScholarshipTier) -> LedgerResult<StudentBalance> {
        self.cache.write_through(student_id, || -> LedgerResult<_> {
            let committed = self.student_repo.set_tier(student_id, tier)?;
            Ok((committed.clone(), committed))
        })
    }

    pub fn set_status(&self, student_id: &str, status: StudentStatus) -> LedgerResult<StudentBalance> {
        self.cache.write_through(student_id, || -> LedgerResult<_> {
            let committed = self.student_repo.set_status(student_id, status)?;
            Ok((committed.clone(), committed))
        })
    }

    pub fn set_membership(
        &self,
        student_id: &str,
        membership: MembershipStatus,
    ) -> LedgerResult<StudentBalance> {
        self.cache.write_through(student_id, || -> LedgerResult<_> {
            let committed = self.student_repo.set_membership(student_id, membership)?;
            Ok((committed.clone(), committed))
        })
    }

    // ==========================================
    // 账本 (写穿透提交后的行)
    // ==========================================

    pub fn deduct(&self, student_id: &str, amount: f64) -> LedgerResult<BalanceUpdate> {
        self.cache.write_through(student_id, || -> LedgerResult<_> {
            let update = self.ledger.deduct(student_id, amount)?;
            let committed = update.after.clone();
            Ok((update, committed))
        })
    }

    pub fn purchase_package(&self, student_id: &str, hours: f64) -> LedgerResult<CreditPackage> {
        self.cache.write_through(student_id, || -> LedgerResult<_> {
            let purchase = self.ledger.purchase_package(student_id, hours)?;
            Ok((purchase.package, purchase.balance))
        })
    }

    /// 课时包 FIFO 扣减不改动聚合余额,缓存无需处理
    pub fn deduct_packages(&self, student_id: &str, amount: f64) -> LedgerResult<FifoDeduction> {
        self.ledger.deduct_packages(student_id, amount)
    }

    // ==========================================
    // 补课券 (失效后重新加载)
    // ==========================================

    pub fn create_makeup(
        &self,
        student_id: &str,
        missed_coach: &str,
        missed_class: &str,
    ) -> LedgerResult<MakeupCredit> {
        self.cache.invalidate_through([student_id], || {
            self.makeups.create(student_id, missed_coach, missed_class)
        })
    }

    pub fn assign_makeup(
        &self,
        student_id: &str,
        ticket_id: &str,
        class_details: AssignedClass,
    ) -> LedgerResult<MakeupCredit> {
        self.cache.invalidate_through([student_id], || {
            self.makeups.assign(student_id, ticket_id, class_details)
        })
    }

    pub fn redeem_makeup(&self, student_id: &str, ticket_id: &str) -> LedgerResult<MakeupCredit> {
        self.cache
            .invalidate_through([student_id], || self.makeups.redeem(student_id, ticket_id))
    }

    pub fn delete_makeup(&self, student_id: &str, ticket_id: &str) -> LedgerResult<()> {
        self.cache
            .invalidate_through([student_id], || self.makeups.delete(student_id, ticket_id))
    }

    // ==========================================
    // 考勤 / 导入
    // ==========================================

    pub fn process_attendance(&self, session: &AttendanceSession) -> LedgerResult<SessionSummary> {
        let ids = session
            .classes
            .iter()
            .flat_map(|c| c.marks.iter())
            .filter_map(|mark| mark.entry.student_id.as_deref());
        self.cache
            .invalidate_through(ids, || self.attendance.process(session))
    }

    pub fn import_students(&self, path: &Path) -> ImportResult<ImportSummary> {
        self.cache
            .invalidate_all_through(|| self.importer.import_file(path))
    }

    pub fn purge_students(&self) -> ImportResult<SweepSummary> {
        self.cache.invalidate_all_through(|| self.importer.purge_all())
    }

    // ==========================================
    // 建议 (只读)
    // ==========================================

    pub fn student_snapshot(&self, student_id: &str) -> LedgerResult<StudentSnapshot> {
        let balance = self.get_student(student_id)?;
        let open_makeups = self.makeups.list_redeemable(student_id)?.len();
        let recent_attendance = self
            .attendance_log_repo
            .recent_for_student(student_id, RECENT_ATTENDANCE_WINDOW)?;
        Ok(StudentSnapshot {
            balance,
            open_makeups,
            recent_attendance,
            notes: None,
        })
    }

    /// 批量生成建议; 找不到的学员直接略过
    pub async fn advise(&self, student_ids: &[String]) -> Vec<(String, AdvisoryReport)> {
        let snapshots: Vec<StudentSnapshot> = student_ids
            .iter()
            .filter_map(|id| match self.student_snapshot(id) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(student_id = %id, error = %e, "学员快照获取失败,跳过建议");
                    None
                }
            })
            .collect();
        self.advisory.analyze_many(&snapshots).await
    }
}

/// 获取默认数据库路径
///
/// 优先读取环境变量 SCHOOL_LEDGER_DB_PATH,否则使用用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SCHOOL_LEDGER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./school_ledger.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        let dir = data_dir.join("school-credit-ledger-dev");
        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("school-credit-ledger");

        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("school_ledger.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedClock;
    use chrono::{TimeZone, Utc};

    fn state() -> AppState {
        let conn = db::open_in_memory_shared().unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
        ));
        AppState::with_connection(conn, clock).unwrap()
    }

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_deduct_caches_committed_balance() {
        let state = state();
        let student = StudentBalance::new_enrollment("s1", "Anny", 10.0, state.clock.now());
        state.create_student(&student).unwrap();

        state.deduct("s1", 2.0).unwrap();
        assert_eq!(state.cache.get("s1").unwrap().credits, 8.0);

        state.purchase_package("s1", 5.0).unwrap();
        let cached = state.get_student("s1").unwrap();
        assert_eq!(cached.credits, 13.0);
        assert_eq!(cached.total_hours, 15.0);
        assert_eq!(state.student_repo.get_balance("s1").unwrap().credits, 13.0);
    }

    #[test]
    fn test_failed_deduct_leaves_cache_untouched() {
        let state = state();
        let student = StudentBalance::new_enrollment("s1", "Anny", 1.0, state.clock.now());
        state.create_student(&student).unwrap();

        assert!(state.deduct("s1", -1.0).is_err());
        assert!(state.deduct("ghost", 1.0).is_err());
        assert!(state.cache.get("ghost").is_none());
        assert_eq!(state.cache.get("s1").unwrap().credits, 1.0);
    }

    #[test]
    fn test_attribute_writes_refresh_cache() {
        let state = state();
        let student = StudentBalance::new_enrollment("s1", "Anny", 10.0, state.clock.now());
        state.create_student(&student).unwrap();

        state.set_status("s1", StudentStatus::Drop).unwrap();
        assert_eq!(state.get_student("s1").unwrap().status, StudentStatus::Drop);

        state
            .set_membership("s1", MembershipStatus::NonMember)
            .unwrap();
        assert_eq!(
            state.cache.get("s1").unwrap().membership,
            MembershipStatus::NonMember
        );
    }

    #[test]
    fn test_makeup_mutation_invalidates_cache() {
        let state = state();
        let student = StudentBalance::new_enrollment("s1", "Anny", 10.0, state.clock.now());
        state.create_student(&student).unwrap();
        assert!(state.cache.get("s1").is_some());

        state.create_makeup("s1", "Kier", "Phonics A").unwrap();
        assert!(state.cache.get("s1").is_none());

        let snapshot = state.student_snapshot("s1").unwrap();
        assert_eq!(snapshot.open_makeups, 1);
    }
}
