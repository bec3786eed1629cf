use litequery::config::load_config;
use litequery::{Clauses, Connector, Filter, LiteQueryError, Result};
use std::process::ExitCode;
use tracing::info;

const USAGE: &str = "usage: litequery <dsn|config.toml> <table> [filter-json] [page|clauses-json]";

fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the rows
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !(2..=4).contains(&args.len()) {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LiteQueryError::Usage(msg)) => {
            eprintln!("litequery: {}", msg);
            eprintln!("{}", USAGE);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("litequery: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let source = &args[0];
    let connector = if source.ends_with(".toml") {
        Connector::from_config(&load_config(source)?)?
    } else {
        Connector::new(source.as_str())?
    };

    let filter = match args.get(2) {
        Some(json) => Filter::try_from(serde_json::from_str::<serde_json::Value>(json)?)?,
        None => Filter::new(),
    };
    let clauses = match args.get(3) {
        Some(arg) => parse_clauses(arg)?,
        None => Clauses::new(),
    };

    let rs = connector.resultset(&args[1])?.search(filter, clauses);
    info!(table = rs.table(), "querying");
    let rows = rs.array_of_hash_rows(&[])?;
    println!("{}", serde_json::to_string_pretty(&rows)?);

    if rs.is_paginating() {
        let pager = rs.pager()?;
        eprintln!(
            "page {} of {}, entries {}-{} of {}",
            pager.current_page(),
            pager.last_page(),
            pager.first(),
            pager.last(),
            pager.total_entries()
        );
    }
    Ok(())
}

/// A bare number is a page; anything starting with `{` is a clauses object
/// such as `{"order_by": [{"column": "id", "direction": "desc"}], "limit": 5}`.
fn parse_clauses(arg: &str) -> Result<Clauses> {
    if arg.trim_start().starts_with('{') {
        return serde_json::from_str(arg)
            .map_err(|e| LiteQueryError::Usage(format!("invalid clauses `{}`: {}", arg, e)));
    }
    let page: u64 = arg
        .parse()
        .map_err(|_| LiteQueryError::Usage(format!("invalid page number `{}`", arg)))?;
    Ok(Clauses::new().page(page))
}
