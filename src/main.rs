// ==========================================
// 计划对账引擎 - 命令行入口
// ==========================================
// 用法:
//   plan-recon -i <aggregate.json> <detail.json> -o <out.json>
//              [-I <input_dir>] [--capacity f] [--open-po f]
//              [--period-score f] [--period-cost f] [--calendar f]
//              [--config f.json] [--set key=value]... [--log-json]
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use plan_recon::config::ReconConfig;
use plan_recon::engine::{ReconInput, ReconciliationEngine};
use plan_recon::importer::{load_aggregate, load_calendar, load_detail, SideTableLoader, SideTablePaths};
use plan_recon::{logging, APP_NAME, VERSION};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const USAGE: &str = "用法: plan-recon -i <aggregate.json> <detail.json> -o <out.json> \
[-I <input_dir>] [--capacity f] [--open-po f] [--period-score f] [--period-cost f] \
[--calendar f] [--config f.json] [--set key=value]... [--log-json]";

#[derive(Debug, Default)]
struct CliArgs {
    aggregate: Option<PathBuf>,
    detail: Option<PathBuf>,
    output: Option<PathBuf>,
    side_tables: SideTablePaths,
    calendar: Option<PathBuf>,
    config: Option<PathBuf>,
    overrides: BTreeMap<String, String>,
    log_json: bool,
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("参数 {} 缺少取值\n{}", flag, USAGE))
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = raw.into_iter();
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-i" | "--input" => {
                cli.aggregate = Some(next_value(&mut args, &flag)?.into());
                cli.detail = Some(next_value(&mut args, &flag)?.into());
            }
            "-o" | "--output" => cli.output = Some(next_value(&mut args, &flag)?.into()),
            "-I" | "--input-dir" => {
                cli.side_tables.input_dir = Some(next_value(&mut args, &flag)?.into())
            }
            "--capacity" => cli.side_tables.capacity = Some(next_value(&mut args, &flag)?.into()),
            "--open-po" => cli.side_tables.open_po = Some(next_value(&mut args, &flag)?.into()),
            "--period-score" => {
                cli.side_tables.period_score = Some(next_value(&mut args, &flag)?.into())
            }
            "--period-cost" => {
                cli.side_tables.period_cost = Some(next_value(&mut args, &flag)?.into())
            }
            "--calendar" => cli.calendar = Some(next_value(&mut args, &flag)?.into()),
            "--config" => cli.config = Some(next_value(&mut args, &flag)?.into()),
            "--set" => {
                let pair = next_value(&mut args, &flag)?;
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--set 需要 key=value 形式: {}", pair))?;
                cli.overrides
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            "--log-json" => cli.log_json = true,
            "-h" | "--help" => {
                println!("{} {}\n{}", APP_NAME, VERSION, USAGE);
                std::process::exit(0);
            }
            other => bail!("未知参数: {}\n{}", other, USAGE),
        }
    }
    Ok(cli)
}

fn main() -> Result<()> {
    let cli = parse_args(std::env::args().skip(1))?;
    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    let (aggregate_path, detail_path) = match (&cli.aggregate, &cli.detail) {
        (Some(a), Some(d)) => (a, d),
        _ => bail!("缺少 -i <aggregate.json> <detail.json>\n{}", USAGE),
    };
    let output_path = cli
        .output
        .as_ref()
        .ok_or_else(|| anyhow!("缺少 -o <out.json>\n{}", USAGE))?;

    let config_json = match &cli.config {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?,
        ),
        None => None,
    };
    let config = ReconConfig::from_sources(config_json.as_deref(), &cli.overrides)
        .context("配置无效")?;

    let aggregate = load_aggregate(aggregate_path)
        .with_context(|| format!("读取聚合计划失败: {}", aggregate_path.display()))?;
    let detail = load_detail(detail_path)
        .with_context(|| format!("读取明细计划失败: {}", detail_path.display()))?;
    let calendar = match &cli.calendar {
        Some(path) if path.exists() => Some(
            load_calendar(path)
                .with_context(|| format!("读取日历失败: {}", path.display()))?,
        ),
        Some(path) => {
            tracing::warn!(path = %path.display(), "日历文件不存在, 按无日历处理");
            None
        }
        None => None,
    };
    let side = SideTableLoader::new()
        .load(&cli.side_tables)
        .context("读取辅助表失败")?;

    let engine = ReconciliationEngine::new(config);
    let output = engine.run(ReconInput {
        schema_version: detail.schema_version,
        aggregate: aggregate.rows,
        detail: detail.rows,
        capacity: side.capacity,
        calendar,
        inbound: side.open_po,
        period_score: side.period_score,
        period_cost: side.period_cost,
    });

    let doc = serde_json::to_string_pretty(&output).context("序列化结果失败")?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("创建输出目录失败: {}", parent.display()))?;
    }
    fs::write(output_path, doc)
        .with_context(|| format!("写入结果失败: {}", output_path.display()))?;

    tracing::info!(output = %output_path.display(), note = %output.note, "结果已写出");
    println!("{}", output.note);
    Ok(())
}
