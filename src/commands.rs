//! Command handlers behind the CLI.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};

use crate::{
    cli::{
        BuildArgs, ChoicesArgs, ConfigArgs, ConfigCommand, DedupeArgs, FilterArgs, LeavesArgs,
        OutputArgs, SourceArgs, TableArgs, TaxonomyArgs, TaxonomyFormat, parse_condition,
    },
    config::Config,
    events,
    filter::{FilterSpec, Selection},
    frame::Frame,
    io_utils,
    provider::CsvSources,
    snapshot::{self, Snapshot},
    table,
};

pub fn build(args: &BuildArgs) -> Result<()> {
    let config = load_config(args.sources.config.as_deref())?;
    let snapshot = snapshot::refresh(&csv_sources(&args.sources)?, &config)?;
    let report = snapshot.report();
    if let Some(dedup) = &report.dedup {
        info!(
            "Events: {} row(s) reduced to {} ({} ambiguous tie(s))",
            dedup.input, dedup.groups, dedup.ambiguous_ties
        );
    }
    emit(snapshot.wide(), &args.output)
}

pub fn dedupe(args: &DedupeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_delimiter(Some(&args.input), args.delimiter);
    info!(
        "Deduplicating '{}' using delimiter '{}'",
        args.input.display(),
        io_utils::printable_delimiter(delimiter)
    );
    let frame = Frame::read_csv(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading events from {:?}", args.input))?;
    let records = events::records_from_frame(&frame, &config.events)?;
    let (survivors, report) = events::deduplicate_latest(&records, &config.date_formats);
    info!(
        "Kept {} of {} event row(s); {} discarded, {} ambiguous tie(s)",
        report.groups, report.input, report.discarded, report.ambiguous_ties
    );
    emit(&events::records_to_frame(&survivors, &config.events), &args.output)
}

pub fn taxonomy(args: &TaxonomyArgs) -> Result<()> {
    let config = load_config(args.table.sources.config.as_deref())?;
    let snapshot = load_snapshot(&args.table, &config)?;
    match args.format {
        TaxonomyFormat::Json => {
            let rendered = serde_json::to_string_pretty(&snapshot.taxonomy().to_nested())
                .context("Serializing taxonomy")?;
            println!("{rendered}");
        }
        TaxonomyFormat::Tree => print!("{}", snapshot.taxonomy().render_tree(&config)),
    }
    Ok(())
}

pub fn leaves(args: &LeavesArgs) -> Result<()> {
    let config = load_config(args.table.sources.config.as_deref())?;
    let snapshot = load_snapshot(&args.table, &config)?;
    let headers = snapshot.wide().headers();
    let entries = snapshot
        .leaves()
        .entries()
        .iter()
        .filter(|entry| !args.filters_only || entry.leaf.is_filter())
        .collect::<Vec<_>>();
    if args.json {
        let rendered = serde_json::to_string_pretty(&entries).context("Serializing leaves")?;
        println!("{rendered}");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|entry| {
            vec![
                entry.id.clone(),
                entry.leaf.kind_label().to_string(),
                entry.leaf.physical_columns(&headers).join("; "),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["id".into(), "kind".into(), "columns".into()], &rows);
    Ok(())
}

pub fn choices(args: &ChoicesArgs) -> Result<()> {
    let config = load_config(args.table.sources.config.as_deref())?;
    let snapshot = load_snapshot(&args.table, &config)?;
    let mut choices = snapshot.choices(&config);
    if !args.leaves.is_empty() {
        choices.retain(|choice| args.leaves.contains(&choice.id));
    }
    if args.json {
        let rendered = serde_json::to_string_pretty(&choices).context("Serializing choices")?;
        println!("{rendered}");
        return Ok(());
    }
    let rows = choices
        .iter()
        .map(|choice| {
            vec![
                choice.id.clone(),
                choice.leaf.kind_label().to_string(),
                choice.values.join(", "),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["id".into(), "kind".into(), "values".into()], &rows);
    Ok(())
}

pub fn filter(args: &FilterArgs) -> Result<()> {
    let config = load_config(args.table.sources.config.as_deref())?;
    let snapshot = load_snapshot(&args.table, &config)?;

    let mut spec = match &args.spec {
        Some(path) => FilterSpec::load(path)?,
        None => FilterSpec::new(),
    };
    for condition in &args.conditions {
        let (id, values) = parse_condition(condition).map_err(|err| anyhow!(err))?;
        spec.insert(&id, values);
    }

    let selection = if args.all_columns {
        Selection::new(snapshot.wide().headers())
    } else if args.columns.is_empty() {
        Selection::new(config.default_columns.iter().cloned())
    } else {
        Selection::new(
            args.columns
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(String::from),
        )
    };
    debug!("Column selection: {selection:?}");

    let (result, report) = snapshot.apply(&spec, &selection);
    info!(
        "Filter matched {} of {} row(s); {} column(s) selected",
        report.matched_rows,
        report.total_rows,
        result.column_count()
    );
    emit(&result, &args.output)
}

pub fn config(args: &ConfigArgs) -> Result<()> {
    match &args.command {
        ConfigCommand::Init(init) => {
            if init.output.exists() && !init.force {
                bail!(
                    "{:?} already exists; pass --force to overwrite it",
                    init.output
                );
            }
            Config::default().save(&init.output)?;
            info!("Default configuration written to {:?}", init.output);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load_or_default(path)?;
    if let Some(path) = path {
        debug!("Loaded configuration from {path:?}");
    }
    Ok(config)
}

fn csv_sources(args: &SourceArgs) -> Result<CsvSources> {
    if args.roster.is_none() {
        bail!("A roster export is required (--roster)");
    }
    Ok(CsvSources {
        roster: args.roster.clone(),
        events: args.events.clone(),
        grades_primary: args.grades_primary.clone(),
        grades_secondary: args.grades_secondary.clone(),
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    })
}

fn load_snapshot(args: &TableArgs, config: &Config) -> Result<Snapshot> {
    match &args.input {
        Some(path) => {
            let encoding = io_utils::resolve_encoding(args.sources.input_encoding.as_deref())?;
            let delimiter = io_utils::resolve_delimiter(Some(path), args.sources.delimiter);
            let wide = Frame::read_csv(path, delimiter, encoding)
                .with_context(|| format!("Reading wide table from {path:?}"))?;
            info!(
                "Loaded wide table {:?}: {} row(s) x {} column(s)",
                path,
                wide.row_count(),
                wide.column_count()
            );
            Ok(Snapshot::from_wide(wide))
        }
        None => snapshot::refresh(&csv_sources(&args.sources)?, config),
    }
}

fn emit(frame: &Frame, output: &OutputArgs) -> Result<()> {
    if output.table {
        table::print_frame(frame, output.limit);
        return Ok(());
    }
    let delimiter = io_utils::resolve_delimiter(output.output.as_deref(), output.output_delimiter);
    frame.write_csv(output.output.as_deref(), delimiter)?;
    if let Some(path) = output.output.as_deref().filter(|p| !io_utils::is_dash(p)) {
        info!(
            "Wrote {} row(s) x {} column(s) to {:?}",
            frame.row_count(),
            frame.column_count(),
            path
        );
    }
    Ok(())
}
