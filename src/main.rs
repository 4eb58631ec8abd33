// ==========================================
// 语言学校课时账本 - 命令行入口
// ==========================================
// 用法:
//   school-credit-ledger                 输出账本概况
//   school-credit-ledger import <csv>    导入学员
//   school-credit-ledger advise          生成全部学员续费建议
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use school_credit_ledger::app::{get_default_db_path, AppState};
use school_credit_ledger::logging;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", school_credit_ledger::APP_NAME, school_credit_ledger::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => print_overview(&state)?,
        Some("import") => {
            let path = args
                .get(1)
                .map(PathBuf::from)
                .context("用法: school-credit-ledger import <csv>")?;
            let summary = state
                .import_students(&path)
                .with_context(|| format!("导入失败: {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Some("advise") => {
            let ids = state.student_repo.list_ids()?;
            for (id, report) in state.advise(&ids).await {
                println!("{}\t{}\t{}", id, report.risk_level, report.action_item);
            }
        }
        Some(other) => bail!("未知命令: {}", other),
    }

    Ok(())
}

fn print_overview(state: &AppState) -> Result<()> {
    let students = state.student_repo.list_all()?;
    let open_makeups = state.makeup_repo.list_open()?;
    let overdrawn = students.iter().filter(|s| s.is_overdrawn()).count();

    tracing::info!(
        students = students.len(),
        open_makeups = open_makeups.len(),
        overdrawn,
        "账本概况"
    );
    println!(
        "学员 {} 人, 未使用补课券 {} 张, 透支 {} 人",
        students.len(),
        open_makeups.len(),
        overdrawn
    );
    Ok(())
}
