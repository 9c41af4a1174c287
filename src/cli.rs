//! Operator CLI over the pure parts of the core.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::config::PanelConfig;
use crate::model::filter::{Filter, FilterOperation};
use crate::model::types::{LogLevel, UserState};
use crate::persist::releases;
use crate::persist::storage::{FileStore, load_json};
use crate::persist::url::{UrlParams, decode_user_state, encode_user_state};
use crate::query::builder::{generate_histogram_query, paginate};
use crate::query::time::TimeRange;
use crate::search::parser::{extract_tokens, free_text};
use crate::state::settings::SettingsState;

#[derive(Parser, Debug)]
#[command(name = "carboncat", version, about = "ClickHouse log panel core: query generation, search expressions, share links")]
pub struct Cli {
    /// Configuration file (defaults to the XDG config location).
    #[arg(long, global = true, env = "CARBONCAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved log query.
    Query(QueryArgs),
    /// Parse a search-bar expression into filters and free text.
    Parse {
        text: String,
    },
    /// Encode or decode share-link parameters.
    #[command(subcommand)]
    Link(LinkCommand),
    /// Inspect saved views in the state store.
    #[command(subcommand)]
    Views(ViewsCommand),
    /// Print release notes not yet seen.
    Releases {
        /// Remember the newest printed version.
        #[arg(long)]
        mark_seen: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    #[arg(long, default_value = "")]
    pub search: String,

    /// `key=value`, `key!=value` or `key~value`; repeatable.
    #[arg(long = "filter", value_parser = parse_filter_arg)]
    pub filters: Vec<Filter>,

    /// Enabled level; repeatable. All levels when omitted.
    #[arg(long = "level", value_parser = parse_level_arg)]
    pub levels: Vec<LogLevel>,

    /// Label key to project; repeatable. The default labels when omitted.
    #[arg(long = "label")]
    pub labels: Vec<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Wrap the query in the level histogram.
    #[arg(long)]
    pub histogram: bool,

    /// Print the streaming page starting at this offset.
    #[arg(long, value_name = "OFFSET", conflicts_with = "histogram")]
    pub chunk: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum LinkCommand {
    /// Read a user-state JSON document from stdin and print URL parameters.
    Encode {
        /// Resolve the time window to absolute timestamps.
        #[arg(long)]
        absolute: bool,
    },
    /// Print the user state encoded by a query string.
    Decode { query: String },
}

#[derive(Subcommand, Debug)]
pub enum ViewsCommand {
    List,
    Show { name: String },
}

/// `key<op>value`, with `!=` taking precedence over `=`.
pub fn parse_filter_arg(raw: &str) -> Result<Filter, String> {
    for (idx, _) in raw.char_indices() {
        let rest = &raw[idx..];
        let op = if rest.starts_with("!=") {
            Some((FilterOperation::NotEq, 2))
        } else if rest.starts_with('=') {
            Some((FilterOperation::Eq, 1))
        } else if rest.starts_with('~') {
            Some((FilterOperation::Contains, 1))
        } else {
            None
        };
        if let Some((operation, width)) = op {
            let key = &raw[..idx];
            if key.is_empty() {
                return Err(format!("filter '{raw}' has no key"));
            }
            return Ok(Filter::new(key, operation, &raw[idx + width..]));
        }
    }
    Err(format!("filter '{raw}' needs one of =, != or ~"))
}

fn parse_level_arg(raw: &str) -> Result<LogLevel, String> {
    LogLevel::parse(raw).ok_or_else(|| format!("unknown level '{raw}'"))
}

fn load_config(cli: &Cli) -> Result<PanelConfig> {
    match &cli.config {
        Some(path) => {
            PanelConfig::load_from(path).with_context(|| format!("failed to load config {}", path.display()))
        }
        None => PanelConfig::load().context("failed to load config"),
    }
}

fn open_store(config: &PanelConfig) -> Result<FileStore> {
    let path = config.state_file().context("no state directory")?;
    FileStore::open(&path).with_context(|| format!("failed to open state store {}", path.display()))
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Query(args) => run_query(&config, args, out),
        Commands::Parse { text } => {
            let parsed = extract_tokens(&text);
            let doc = serde_json::json!({
                "filters": parsed.filters,
                "remainder": parsed.remainder,
                "searchTerm": free_text(&parsed.remainder),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)?;
            Ok(())
        }
        Commands::Link(LinkCommand::Encode { absolute }) => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input).context("failed reading stdin")?;
            let state: UserState = serde_json::from_str(&input).context("stdin is not a user-state document")?;
            let range = if absolute {
                Some(TimeRange::resolve(&state.time_from, &state.time_to, chrono::Utc::now())?)
            } else {
                None
            };
            writeln!(out, "{}", encode_user_state(&state, range.as_ref()).to_query_string())?;
            Ok(())
        }
        Commands::Link(LinkCommand::Decode { query }) => {
            let base = UserState::default().with_datasource(config.default_data_source());
            let state = decode_user_state(&UrlParams::parse(&query), base);
            writeln!(out, "{}", serde_json::to_string_pretty(&state)?)?;
            Ok(())
        }
        Commands::Views(cmd) => {
            let store = open_store(&config)?;
            let settings: SettingsState =
                load_json(&store, &config.storage_keys().settings).unwrap_or_default();
            match cmd {
                ViewsCommand::List => {
                    for name in settings.view_names() {
                        writeln!(out, "{name}")?;
                    }
                }
                ViewsCommand::Show { name } => {
                    let view = settings.view(&name)?;
                    writeln!(out, "{}", serde_json::to_string_pretty(view)?)?;
                }
            }
            Ok(())
        }
        Commands::Releases { mark_seen } => {
            let store = open_store(&config)?;
            let key = config.storage_keys().last_seen_version;
            let notes = releases::unseen_in(&store, &key);
            for note in &notes {
                writeln!(out, "{}\n  {}\n", note.version, note.notes)?;
            }
            if mark_seen {
                releases::mark_seen(&store, &key, &notes)?;
            }
            Ok(())
        }
    }
}

fn run_query(config: &PanelConfig, args: QueryArgs, out: &mut dyn Write) -> Result<()> {
    let defaults = UserState::default();
    let labels = if args.labels.is_empty() {
        defaults.selected_labels
    } else {
        args.labels
            .into_iter()
            .map(|l| if l.starts_with("labels.") { l } else { format!("labels.{l}") })
            .collect()
    };
    let levels = if args.levels.is_empty() {
        defaults.log_levels
    } else {
        args.levels
    };
    let limit = args.limit.unwrap_or(config.row_limit);
    if limit == 0 {
        bail!("--limit must be positive");
    }

    let query = config
        .schema()
        .log_query(&args.search, &labels, &args.filters, &levels, limit);
    let rendered = if args.histogram {
        generate_histogram_query(&query)
    } else if let Some(offset) = args.chunk {
        paginate(&query, offset, config.chunk_size)
    } else {
        query
    };
    writeln!(out, "{rendered}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_args_pick_the_right_operator() {
        assert_eq!(parse_filter_arg("level=ERROR").unwrap(), Filter::eq("level", "ERROR"));
        assert_eq!(
            parse_filter_arg("labels.app!=api").unwrap(),
            Filter::new("labels.app", FilterOperation::NotEq, "api")
        );
        assert_eq!(
            parse_filter_arg("body~a=b").unwrap(),
            Filter::new("body", FilterOperation::Contains, "a=b")
        );
        assert!(parse_filter_arg("=x").is_err());
        assert!(parse_filter_arg("nothing").is_err());
    }

    #[test]
    fn query_command_renders_filters() {
        let mut out = Vec::new();
        let args = QueryArgs {
            filters: vec![Filter::eq("level", "ERROR")],
            limit: Some(10),
            ..QueryArgs::default()
        };
        run_query(&PanelConfig::default(), args, &mut out).unwrap();
        let sql = String::from_utf8(out).unwrap();
        assert!(sql.contains("AND ( level = 'ERROR' )"));
        assert!(sql.trim_end().ends_with("LIMIT 10"));
    }

    #[test]
    fn chunk_flag_paginates() {
        let mut out = Vec::new();
        let args = QueryArgs {
            chunk: Some(1000),
            ..QueryArgs::default()
        };
        run_query(&PanelConfig::default(), args, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().trim_end().ends_with("LIMIT 1000, 500"));
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
