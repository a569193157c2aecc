use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;
use tracing_subscriber::EnvFilter;

use smartpl::catalog::FieldCatalog;
use smartpl::library::PlaylistLibrary;
use smartpl::{CompiledPlaylist, Compiler};

/// Compile smart playlist definitions to SQLite query fragments.
#[derive(Debug, Parser)]
#[command(name = "smartpl", version)]
struct Args {
    /// Definition files to compile. Starts an interactive prompt when none are given.
    files: Vec<PathBuf>,

    /// JSON field catalog. Defaults to the built-in media library fields.
    #[arg(long, value_name = "JSON")]
    catalog: Option<PathBuf>,

    /// Directory of *.smartpl files that `in playlist` references resolve against.
    #[arg(long, value_name = "DIR")]
    library: Option<PathBuf>,

    /// Print each result as JSON.
    #[arg(long)]
    json: bool,

    /// Print a whole statement using this `SELECT ... FROM ...` prefix.
    #[arg(long, value_name = "SQL", conflicts_with = "json")]
    select: Option<String>,

    /// `GROUP BY` expression used with `--select` when a playlist has a having clause.
    #[arg(long, value_name = "SQL", default_value = "f.songalbumid")]
    group_by: String,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let catalog = match &args.catalog {
        Some(path) => FieldCatalog::from_json_file(path)
            .with_context(|| format!("loading field catalog {}", path.display()))?,
        None => FieldCatalog::media_library(),
    };
    let library = match &args.library {
        Some(dir) => PlaylistLibrary::load_dir(dir)
            .with_context(|| format!("loading playlist library {}", dir.display()))?,
        None => PlaylistLibrary::new(),
    };
    info!(fields = catalog.len(), playlists = library.len(), "compiler ready");

    let compiler = Compiler::new(catalog).with_resolver(library);

    if args.files.is_empty() {
        repl(&compiler, &args)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut failed = false;
    for path in &args.files {
        let source = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match compiler.compile(&source) {
            Ok(compiled) => print_compiled(&compiled, &args)?,
            Err(e) => {
                eprintln!("{}:{}", path.display(), e.render(&source));
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_compiled(compiled: &CompiledPlaylist, args: &Args) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(compiled)?);
        return Ok(());
    }
    if let Some(select) = &args.select {
        println!("{};", compiled.to_sql(select, Some(args.group_by.as_str()))?);
        return Ok(());
    }

    println!("{}", title_comment(&compiled.title));
    println!("WHERE {}", compiled.where_clause);
    if let Some(having) = &compiled.having_clause {
        println!("HAVING {}", having);
    }
    if let Some(order) = &compiled.order_clause {
        println!("ORDER BY {}", order);
    }
    if let Some(limit) = compiled.limit {
        println!("LIMIT {}", limit);
    }
    Ok(())
}

/// SQL comment naming a playlist. The title is escaped so that a newline in
/// it cannot end the comment.
fn title_comment(title: &str) -> String {
    format!("-- {:?}", title)
}

/// Reads definitions line by line. A definition is compiled once its input
/// ends with `}`; `.fields` lists the catalog and `.quit` exits.
fn repl(compiler: &Compiler<PlaylistLibrary>, args: &Args) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut buffer = String::new();

    println!("smartpl {} (.fields lists fields, .quit exits)", env!("CARGO_PKG_VERSION"));

    loop {
        let prompt = if buffer.is_empty() { "smartpl> " } else { "     ..> " };
        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if buffer.is_empty() {
                    match trimmed {
                        "" => continue,
                        ".quit" | ".exit" => break,
                        ".fields" => {
                            for name in compiler.catalog().names() {
                                println!("  {}", name);
                            }
                            continue;
                        }
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if !trimmed.ends_with('}') {
                    continue;
                }

                editor.add_history_entry(buffer.trim_end())?;
                match compiler.compile(&buffer) {
                    Ok(compiled) => print_compiled(&compiled, args)?,
                    Err(e) => eprintln!("error: {}", e.render(&buffer)),
                }
                buffer.clear();
            }
            Err(ReadlineError::Interrupted) if !buffer.is_empty() => buffer.clear(),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_comment_stays_on_one_line() {
        assert_eq!(title_comment("Rock"), r#"-- "Rock""#);
        let comment = title_comment("x\nDELETE FROM files;");
        assert_eq!(comment, r#"-- "x\nDELETE FROM files;""#);
        assert!(!comment.contains('\n'));
    }

    #[test]
    fn test_select_uses_group_by_for_having() {
        let args = Args::parse_from(["smartpl", "--select", "SELECT f.id FROM files f", "x.smartpl"]);
        assert_eq!(args.group_by, "f.songalbumid");

        let compiled = Compiler::default()
            .compile(r#"smart playlist "p" { genre is "Rock" having play_count > 3 }"#)
            .unwrap();
        let select = args.select.as_deref().unwrap();
        assert_eq!(
            compiled.to_sql(select, Some(args.group_by.as_str())).unwrap(),
            "SELECT f.id FROM files f WHERE f.genre = 'Rock' \
             GROUP BY f.songalbumid HAVING f.play_count > 3"
        );
    }
}
