//! End-to-end catalog run: workbooks → resolve → extract → map → expand →
//! merge → codes → normalize → catalog workbooks + run report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use catalogbuilder_shared::{
    CanonicalProduct, CatalogError, GroupStats, LineConfig, OutputConfig, PipelineConfig, Result,
    Role, RunId, RunReport, SheetStats, Template, WorkDirs, CURRENT_SCHEMA_VERSION, fs,
};
use catalogbuilder_sheets::{CatalogSheet, Sheet, read_template, read_workbook, write_catalog};
use catalogbuilder_storage::{
    FISCAL_CACHE_FILE, FiscalCodeCache, PRODUCT_COUNTER_FILE, ProductCodeCounter,
};

use crate::codes::{CodeAssigner, assign_color_codes};
use crate::expander::expand_all;
use crate::extract::{PageLayout, RawRecord, discard_headers, extract_records, render_flat_text};
use crate::mapper::{FieldMapper, MappingPlan};
use crate::merger::{clean_merged, merge_group};
use crate::normalize::{conform, filter_priced};
use crate::resolver::{ConfigPool, NamedConfig};

/// Workbook extensions picked up from the sheets directory.
pub const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

/// Output stem used when a Config declares no sale file.
const DEFAULT_OUTPUT_STEM: &str = "produtos_mesclados";

/// File name of the run report inside the output directory.
pub const RUN_REPORT_FILE: &str = "run_report.json";

/// Configuration for [`run_catalog`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub dirs: WorkDirs,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
    /// Tool version string recorded in the run report.
    pub tool_version: String,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each workbook or Config group is processed.
    fn item_done(&self, name: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Products gathered for one Config across all of its workbooks.
#[derive(Debug, Default)]
struct GroupInput {
    cost: Vec<CanonicalProduct>,
    sale: Vec<CanonicalProduct>,
}

/// Products and statistics from one workbook.
struct WorkbookOutput {
    sheets: Vec<SheetStats>,
    products: Vec<CanonicalProduct>,
}

/// Run the full catalog pipeline.
///
/// 1. Load Configs, Template and the persisted code stores
/// 2. Per workbook: resolve, extract, map, expand
/// 3. Per Config group: merge, clean, fiscal codes, price filter, product
///    and color codes, write
/// 4. Save the code stores and the run report
///
/// A failing workbook or group is logged, recorded in the report and
/// skipped; missing Configs or Template abort the run.
#[instrument(skip_all, fields(sheets = %config.dirs.sheets.display()))]
pub fn run_catalog(config: &RunConfig, progress: &dyn ProgressReporter) -> Result<RunReport> {
    let start = Instant::now();
    let started_at = Utc::now();
    let id = RunId::new();
    info!(%id, "starting catalog run");

    // --- Phase 1: Configs, Template, code stores ---
    progress.phase("Loading configs and template");
    let pool = ConfigPool::load(&config.dirs.configs)?;
    let template = read_template(&config.dirs.template)?;
    let mut fiscal = FiscalCodeCache::load(&config.dirs.cache.join(FISCAL_CACHE_FILE));
    let mut counter = ProductCodeCounter::load(&config.dirs.cache.join(PRODUCT_COUNTER_FILE));

    let mut sheets = Vec::new();
    let mut failures = Vec::new();

    // --- Phase 2: Workbooks ---
    progress.phase("Extracting workbooks");
    let workbooks = list_workbooks(&config.dirs.sheets)?;
    let mut groups: BTreeMap<usize, GroupInput> = BTreeMap::new();

    for (i, path) in workbooks.iter().enumerate() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(resolution) = pool.resolve(&file_name) else {
            continue;
        };
        let Some(named) = pool.get(resolution.index) else {
            continue;
        };

        let Some(role) = resolution.role else {
            warn!(file = %file_name, config = %named.name, "cannot tell cost from sale, skipping");
            failures.push(format!("{file_name}: role could not be determined"));
            progress.item_done(&file_name, i + 1, workbooks.len());
            continue;
        };

        match process_workbook(path, named, role, config) {
            Ok(output) => {
                sheets.extend(output.sheets);
                let group = groups.entry(resolution.index).or_default();
                match role {
                    Role::Cost => group.cost.extend(output.products),
                    Role::Sale => group.sale.extend(output.products),
                }
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "workbook failed, skipping");
                failures.push(format!("{file_name}: {e}"));
            }
        }
        progress.item_done(&file_name, i + 1, workbooks.len());
    }

    // --- Phase 3: Config groups ---
    progress.phase("Merging and writing catalogs");
    let mut group_stats = Vec::new();
    let total_groups = groups.len();

    for (i, (index, input)) in groups.into_iter().enumerate() {
        let Some(named) = pool.get(index) else {
            continue;
        };
        let mut assigner = CodeAssigner::new(&mut fiscal, &mut counter);
        match process_group(named, input, &template, &mut assigner, config) {
            Ok(stats) => group_stats.push(stats),
            Err(e) => {
                warn!(config = %named.name, error = %e, "group failed, skipping");
                failures.push(format!("{}: {e}", named.name));
            }
        }
        progress.item_done(&named.name, i + 1, total_groups);
    }

    // --- Phase 4: Persist stores and report ---
    progress.phase("Saving caches");
    let new_fiscal_codes = fiscal.added();
    let fiscal_saved = fiscal.save();
    let counter_saved = counter.save();
    fiscal_saved?;
    counter_saved?;

    let report = RunReport {
        schema_version: CURRENT_SCHEMA_VERSION,
        id,
        tool_version: config.tool_version.clone(),
        started_at,
        finished_at: Utc::now(),
        sheets,
        groups: group_stats,
        failures,
        new_fiscal_codes,
        next_product_code: counter.peek(),
    };
    fs::write_json(&config.dirs.output.join(RUN_REPORT_FILE), &report)?;

    progress.done(&report);
    info!(
        id = %report.id,
        groups = report.groups.len(),
        failures = report.failures.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "catalog run complete"
    );

    Ok(report)
}

/// Workbooks in `dir`, sorted by name. A missing directory yields none.
fn list_workbooks(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "sheets directory not found");
        return Ok(Vec::new());
    }
    let files = fs::list_files(dir, &WORKBOOK_EXTENSIONS)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no workbooks found");
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// Per workbook
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(file = %path.display(), config = %named.name, role = %role))]
fn process_workbook(
    path: &Path,
    named: &NamedConfig,
    role: Role,
    config: &RunConfig,
) -> Result<WorkbookOutput> {
    let workbook = read_workbook(path)?;
    let stem = fs::file_stem(path);
    let plan = MappingPlan::for_role(&named.config, Some(role));

    let mut output = WorkbookOutput {
        sheets: Vec::new(),
        products: Vec::new(),
    };

    for sheet in &workbook {
        let Some(records) = sheet_records(sheet, &named.config, Some(role))? else {
            continue;
        };
        let artifact = artifact_stem(&stem, &sheet.name);

        if config.pipeline.write_intermediates {
            fs::write_atomic(
                &config.dirs.flat.join(format!("{artifact}.txt")),
                render_flat_text(&records),
            )?;
        }

        let record_count = records.len();
        let (data, headers_skipped) = discard_headers(records, &plan.source_columns);
        let products = FieldMapper::new(&plan).map_all(&data);

        if config.pipeline.write_intermediates {
            fs::write_json(
                &config.dirs.canonical.join(format!("{artifact}.json")),
                &products,
            )?;
        }

        let products = expand_all(products, Some(role), &named.config.separators);
        info!(
            sheet = %sheet.name,
            records = record_count,
            headers_skipped,
            products = products.len(),
            "sheet processed"
        );

        output.sheets.push(SheetStats {
            workbook: stem.clone(),
            sheet: sheet.name.clone(),
            config: named.name.clone(),
            role: Some(role),
            records: record_count,
            headers_skipped,
            products: products.len(),
        });
        output.products.extend(products);
    }

    Ok(output)
}

/// Records of one sheet, or `None` when the Config excludes the sheet.
///
/// When the Config lists pages, only listed and approved sheets are read.
pub fn sheet_records(
    sheet: &Sheet,
    config: &LineConfig,
    role: Option<Role>,
) -> Result<Option<Vec<RawRecord>>> {
    let fallback_columns: &[String] = role
        .and_then(|r| config.file(r))
        .map(|f| f.columns.as_slice())
        .unwrap_or(&[]);

    let layout = if config.pages.is_empty() {
        PageLayout {
            columns: fallback_columns.to_vec(),
            ..PageLayout::default()
        }
    } else {
        let Some(page) = config.page_for(role, sheet.index, &sheet.name) else {
            debug!(sheet = %sheet.name, "sheet not listed in config pages");
            return Ok(None);
        };
        if !page.is_approved {
            warn!(sheet = %sheet.name, "page not approved, skipping");
            return Ok(None);
        }
        PageLayout::from_page(page, fallback_columns)?
    };

    Ok(Some(extract_records(sheet, &layout)))
}

/// `<workbook stem>_<sheet>` with path separators made safe.
fn artifact_stem(stem: &str, sheet: &str) -> String {
    let sheet: String = sheet
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    format!("{stem}_{}", sheet.trim())
}

// ---------------------------------------------------------------------------
// Per Config group
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(config = %named.name, cost = input.cost.len(), sale = input.sale.len()))]
fn process_group(
    named: &NamedConfig,
    input: GroupInput,
    template: &Template,
    assigner: &mut CodeAssigner<'_>,
    config: &RunConfig,
) -> Result<GroupStats> {
    let mut stats = GroupStats {
        config: named.name.clone(),
        cost_products: input.cost.len(),
        sale_products: input.sale.len(),
        ..GroupStats::default()
    };

    let outcome = merge_group(&input.cost, &input.sale, &named.config);
    stats.merged = outcome.rows.len();
    stats.unmatched_cost = outcome.unmatched_cost;
    stats.unmatched_sale = outcome.unmatched_sale;

    let mut rows = outcome.rows;
    clean_merged(&mut rows, config.pipeline.uppercase_values);

    // Fiscal codes see every merged row; product and color codes only the
    // rows that survive the price filter.
    assigner.assign_fiscal_codes(&mut rows);
    let (mut rows, _dropped) = filter_priced(rows);

    if rows.is_empty() {
        warn!(config = %named.name, "no priced rows, nothing written");
        return Ok(stats);
    }

    assigner.assign_product_codes(&mut rows);
    assign_color_codes(&mut rows);

    let stem = output_stem(&named.config);
    if config.pipeline.write_intermediates {
        fs::write_json(
            &config.dirs.merged.join(format!("{stem}_mesclado.json")),
            &rows,
        )?;
    }

    let cells = conform(&rows, template, &config.output.numeric_columns);
    let path = config.dirs.output.join(format!("{stem}.xlsx"));
    write_catalog(
        &path,
        &CatalogSheet {
            sheet_name: &config.output.sheet_name,
            columns: &template.columns,
            rows: &cells,
            max_column_width: config.output.max_column_width,
        },
    )?;

    stats.rows_written = cells.len();
    stats.output = Some(path.display().to_string());
    info!(rows = stats.rows_written, path = %path.display(), "catalog written");
    Ok(stats)
}

/// Stem of the Config's sale file, used to name group outputs.
pub fn output_stem(config: &LineConfig) -> String {
    config
        .file(Role::Sale)
        .map(|f| fs::file_stem(Path::new(f.path.trim())))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_OUTPUT_STEM.to_string())
}

// ---------------------------------------------------------------------------
// Flat-text export
// ---------------------------------------------------------------------------

/// Write the flat-text artifact of every sheet of `path` into `out_dir`,
/// using the Config the pool resolves for it.
#[instrument(skip_all, fields(file = %path.display()))]
pub fn export_flat_text(path: &Path, pool: &ConfigPool, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CatalogError::validation(format!("not a file: {}", path.display())))?;
    let resolution = pool
        .resolve(&file_name)
        .ok_or_else(|| CatalogError::config("config pool is empty"))?;
    let named = pool
        .get(resolution.index)
        .ok_or_else(|| CatalogError::config("resolved config missing from pool"))?;

    let stem = fs::file_stem(path);
    let mut written = Vec::new();
    for sheet in read_workbook(path)? {
        let Some(records) = sheet_records(&sheet, &named.config, resolution.role)? else {
            continue;
        };
        let target = out_dir.join(format!("{}.txt", artifact_stem(&stem, &sheet.name)));
        fs::write_atomic(&target, render_flat_text(&records))?;
        written.push(target);
    }

    info!(files = written.len(), config = %named.name, "flat text exported");
    Ok(written)
}
