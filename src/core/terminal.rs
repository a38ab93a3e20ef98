use console::{Emoji, style};

use crate::core::sql::SchemaSnapshot;

pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static CLAPPER: Emoji<'_, '_> = Emoji("🎬 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_banner() {
    println!();
    println!("{}{}", CLAPPER, style("MovieBot").bold().magenta());
    println!(
        "{}",
        style("Ask the movie database anything. Read-only, one SELECT at a time.").cyan()
    );
    println!();
}

/// One `table: col, col` line per table, names highlighted.
pub fn print_schema(schema: &SchemaSnapshot) {
    if schema.is_empty() {
        print_warn("The database has no tables.");
        return;
    }
    for (table, columns) in schema.tables() {
        println!("{}: {}", style(table).bold().cyan(), columns.join(", "));
    }
}

/// `--verbose` trace for `ask`; goes to stderr so the answer stays pipeable.
pub fn print_trace(label: &str, msg: &str) {
    eprintln!("  {} {}: {}", GEAR, style(label).dim(), style(msg).dim());
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("Server stopped. See you next time!").bold().cyan()
    );
}
