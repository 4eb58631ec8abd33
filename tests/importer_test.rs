// ==========================================
// 学员导入集成测试
// ==========================================
// 覆盖: CSV 清洗、分批写入 (<= 450)、upsert、删除清理
// ==========================================


use school_credit_ledger::importer::{ImportError, StudentImporter};
use school_credit_ledger::repository::BalanceStore;
use school_credit_ledger::{MembershipStatus, ScholarshipTier, StudentStatus};
use std::io::Write;
use tempfile::NamedTempFile;
use test_helpers::{create_test_state, seed_student};

const HEADER: &str = "student_id,student_name,member_status,status,total_hours,credits,used_hours";

fn csv_with_rows(n: usize) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for i in 0..n {
        out.push_str(&format!("S{:04},Student {},Member,active,20,,\n", i, i));
    }
    out
}

#[test]
fn test_import_chunks_at_450() {
    let (_tmp, state, _clock) = create_test_state().unwrap();

    let summary = state
        .importer
        .import_reader(csv_with_rows(1000).as_bytes())
        .unwrap();

    assert_eq!(summary.total_rows, 1000);
    assert_eq!(summary.imported, 1000);
    assert_eq!(summary.batches, 3);
    assert!(summary.rejected.is_empty());
    assert_eq!(state.student_repo.list_ids().unwrap().len(), 1000);

    let s = state.student_repo.get_balance("S0999").unwrap();
    assert_eq!(s.credits, 20.0);
    assert_eq!(s.used_hours, 0.0);
    assert_eq!(s.status, StudentStatus::Active);
}

#[test]
fn test_small_batch_size_from_constructor() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    let importer = StudentImporter::new(state.student_repo.clone(), state.clock.clone(), 10);

    let summary = importer.import_reader(csv_with_rows(25).as_bytes()).unwrap();
    assert_eq!(summary.batches, 3);

    let ids = state.student_repo.list_ids().unwrap();
    let sweep = importer.delete_sweep(&ids).unwrap();
    assert_eq!(sweep.requested, 25);
    assert_eq!(sweep.deleted, 25);
    assert_eq!(sweep.batches, 3);
    assert!(state.student_repo.list_ids().unwrap().is_empty());
}

#[test]
fn test_row_cleaning_and_rejections() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    let csv = format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n",
        HEADER,
        "S1, Anny ,Not Member,,\"1,200\",15,5",
        "S2,B,Member,,10,,",
        ",Nameless Kid,Member,,10,,",
        "S3,Cream,Member,,ten,,",
        "S4,Dao,,new,8,,",
    );

    let summary = state.importer.import_reader(csv.as_bytes()).unwrap();

    assert_eq!(summary.total_rows, 5);
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.skipped_blank, 1);
    assert_eq!(summary.rejected.len(), 2);

    let anny = state.student_repo.get_balance("S1").unwrap();
    assert_eq!(anny.student_name, "Anny");
    assert_eq!(anny.total_hours, 1200.0);
    assert_eq!(anny.credits, 15.0);
    assert_eq!(anny.used_hours, 5.0);
    assert_eq!(anny.membership, MembershipStatus::NonMember);

    let dao = state.student_repo.get_balance("S4").unwrap();
    assert_eq!(dao.membership, MembershipStatus::Member);
    assert_eq!(dao.status, StudentStatus::New);
}

#[test]
fn test_reimport_keeps_tier_and_makeups() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    seed_student(
        &state,
        "S1",
        "Anny",
        10.0,
        ScholarshipTier::Scholarship,
        MembershipStatus::Member,
    );
    state.create_makeup("S1", "Kier", "Phonics A").unwrap();

    let csv = format!("{}\nS1,Anny Updated,Member,active,30,,\n", HEADER);
    state.importer.import_reader(csv.as_bytes()).unwrap();

    let s = state.student_repo.get_balance("S1").unwrap();
    assert_eq!(s.student_name, "Anny Updated");
    assert_eq!(s.total_hours, 30.0);
    assert_eq!(s.tier, ScholarshipTier::Scholarship);
    assert_eq!(state.makeups.list("S1").unwrap().len(), 1);
}

#[test]
fn test_purge_cascades_makeups_and_packages() {
    let (_tmp, state, _clock) = create_test_state().unwrap();
    state
        .importer
        .import_reader(csv_with_rows(3).as_bytes())
        .unwrap();
    state.create_makeup("S0001", "Kier", "Phonics A").unwrap();
    state.purchase_package("S0001", 5.0).unwrap();

    let sweep = state.purge_students().unwrap();
    assert_eq!(sweep.deleted, 3);
    assert!(state.makeup_repo.list_by_student("S0001").unwrap().is_empty());
    assert!(state.package_repo.list_by_student("S0001").unwrap().is_empty());
}

#[test]
fn test_import_file_checks_path_and_extension() {
    let (_tmp, state, _clock) = create_test_state().unwrap();

    let missing = state.import_students(std::path::Path::new("/nonexistent/students.csv"));
    assert!(matches!(missing, Err(ImportError::FileNotFound(_))));

    let txt = NamedTempFile::with_suffix(".txt").unwrap();
    assert!(matches!(
        state.import_students(txt.path()),
        Err(ImportError::UnsupportedFormat(_))
    ));

    let mut file = NamedTempFile::with_suffix(".csv").unwrap();
    file.write_all(csv_with_rows(2).as_bytes()).unwrap();
    file.flush().unwrap();
    let summary = state.import_students(file.path()).unwrap();
    assert_eq!(summary.imported, 2);
}
