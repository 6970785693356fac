use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use konomiza::format::{format_currency, format_date};
use konomiza::{
    load_csv, AppState, AutoResolveRules, MonthlyGoal, Settings, Source, SqliteStore,
    TextService, TracingNotifier,
};

const DEFAULT_CONFIG: &str = "konomiza.json";
const DEFAULT_LIST_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    let settings = load_settings()?;
    init_tracing(&settings.log_level);

    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    let mut app = open_app(settings)?;
    let rest = &args[1..];

    match command.as_str() {
        "import" => run_import(&mut app, rest)?,
        "list" => run_list(&app, rest)?,
        "duplicates" => run_duplicates(&app),
        "resolve" => run_resolve(&mut app, rest),
        "stats" => run_stats(&app),
        "goal" => run_goal(&mut app, rest)?,
        "learn" => run_learn(&mut app, rest)?,
        "ask" => run_ask(&mut app, rest).await?,
        "help" | "--help" | "-h" => print_usage(),
        other => {
            print_usage();
            bail!("Unknown command: {}", other);
        }
    }

    Ok(())
}

// ============================================================================
// SETUP
// ============================================================================

/// JSON settings file (KONOMIZA_CONFIG or ./konomiza.json) + env overrides
fn load_settings() -> Result<Settings> {
    let path = env::var("KONOMIZA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());

    let settings = if Path::new(&path).exists() {
        Settings::from_file(&path)?
    } else {
        Settings::default()
    };

    Ok(settings.with_env_overrides())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_app(settings: Settings) -> Result<AppState> {
    let store = SqliteStore::open(&settings.storage_path)
        .with_context(|| format!("Failed to open database: {}", settings.storage_path))?;

    let service = text_service(&settings);
    let mut app = AppState::load(settings, Box::new(store))
        .context("Failed to load stored data")?
        .with_notifier(Box::new(TracingNotifier));

    if let Some(service) = service {
        app = app.with_text_service(service);
    }

    Ok(app)
}

#[cfg(feature = "gemini")]
fn text_service(settings: &Settings) -> Option<Box<dyn TextService>> {
    konomiza::GeminiClient::from_settings(&settings.ai)
        .map(|client| Box::new(client) as Box<dyn TextService>)
}

#[cfg(not(feature = "gemini"))]
fn text_service(_settings: &Settings) -> Option<Box<dyn TextService>> {
    None
}

fn print_usage() {
    println!("💰 Konomiza {}", konomiza::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  konomiza import <file.csv>");
    println!("  konomiza list [limit]");
    println!("  konomiza duplicates");
    println!("  konomiza resolve [--keep-original]");
    println!("  konomiza stats");
    println!("  konomiza goal [<amount> <due day> <best buy day> <alert %>]");
    println!("  konomiza learn <name> <category> [subcategory]");
    println!("  konomiza ask <question>");
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_import(app: &mut AppState, args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("Usage: konomiza import <file.csv>");
    };

    println!("📂 Loading {}...", path);
    let inputs = load_csv(Path::new(path))?;
    println!("✓ Parsed {} rows", inputs.len());

    let report = app.import_transactions(inputs, Source::Imported);
    let flagged = report.added.iter().filter(|t| t.is_possible_duplicate).count();

    println!("\n💾 Imported {} transactions", report.added.len());
    if flagged > 0 {
        println!("⚠️  {} flagged as possible duplicates (run: konomiza duplicates)", flagged);
    }
    for (position, err) in &report.failures {
        // +2: 1-indexed plus the header row
        println!("❌ Line {}: {}", position + 2, err);
    }

    Ok(())
}

fn run_list(app: &AppState, args: &[String]) -> Result<()> {
    let limit = match args.first() {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("Invalid limit: {}", raw))?,
        None => DEFAULT_LIST_LIMIT,
    };

    let recent = app.recent(limit);
    if recent.is_empty() {
        println!("Nenhuma transação registrada.");
        return Ok(());
    }

    println!("📋 {} de {} transações\n", recent.len(), app.transactions().len());
    for tx in recent {
        let marker = if tx.is_possible_duplicate { "⚠️ " } else { "" };
        let installment = tx
            .installment_label()
            .map(|label| format!(" [{}]", label))
            .unwrap_or_default();

        println!(
            "{}{}  {:<30} {:>14}  {}{}",
            marker,
            format_date(&tx.date),
            tx.name,
            format_currency(tx.amount),
            tx.category.as_deref().unwrap_or("Sem categoria"),
            installment
        );
    }

    Ok(())
}

fn run_duplicates(app: &AppState) {
    let groups = app.find_all_duplicates();
    if groups.is_empty() {
        println!("✅ Nenhuma duplicata encontrada.");
        return;
    }

    let stats = app.duplicate_stats();
    println!("🔍 {} grupos, {} duplicatas", stats.group_count, stats.duplicate_count);
    println!("   Valor total duplicado: {}", format_currency(stats.total_value));
    println!("   Alta confiança (≥80%): {}\n", stats.high_confidence_count);

    for (index, group) in groups.iter().enumerate() {
        println!("Grupo {} ({}% confiança)", index + 1, group.confidence);
        println!(
            "  Original:  {}  {}  {}",
            format_date(&group.original.date),
            group.original.name,
            format_currency(group.original.amount)
        );
        for duplicate in &group.duplicates {
            println!(
                "  Duplicata: {}  {}  {}  ({})",
                format_date(&duplicate.date),
                duplicate.name,
                format_currency(duplicate.amount),
                duplicate.id
            );
        }
    }
}

fn run_resolve(app: &mut AppState, args: &[String]) {
    let rules = if args.iter().any(|a| a == "--keep-original") {
        AutoResolveRules::default().keep_original()
    } else {
        AutoResolveRules::default()
    };

    let removed = app.auto_resolve(&rules);
    println!("🧹 {} duplicatas removidas", removed);
}

fn run_stats(app: &AppState) {
    let stats = app.statistics();
    let progress = app.goal_progress();

    println!("📊 Estatísticas");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total:          {}", format_currency(stats.total));
    println!("Transações:     {}", stats.count);
    println!("Média:          {}", format_currency(stats.average));
    println!("Maior gasto:    {}", format_currency(stats.largest));
    println!("Menor gasto:    {}", format_currency(stats.smallest));
    println!("Média diária:   {}", format_currency(app.daily_average()));

    println!("\n🏷️  Por categoria");
    for (category, total) in &stats.category_totals {
        println!("  {:<20} {:>14}", category, format_currency(*total));
    }

    println!("\n🎯 Meta de {}", progress.month);
    println!(
        "  {} de {} ({:.1}%)",
        format_currency(progress.monthly_total),
        format_currency(progress.goal),
        progress.progress
    );
    println!("  Fecha em {} dias", progress.days_to_close);

    for insight in app.insights() {
        println!("\n💡 {}: {}", insight.title, insight.message);
    }
    for suggestion in app.suggestions() {
        println!("👉 {}: {}", suggestion.title, suggestion.message);
    }
}

fn run_goal(app: &mut AppState, args: &[String]) -> Result<()> {
    if !args.is_empty() {
        if args.len() != 4 {
            bail!("Usage: konomiza goal <amount> <due day> <best buy day> <alert %>");
        }

        let goal = MonthlyGoal::new(
            args[0]
                .parse()
                .with_context(|| format!("Invalid amount: {}", args[0]))?,
            args[1]
                .parse()
                .with_context(|| format!("Invalid due day: {}", args[1]))?,
            args[2]
                .parse()
                .with_context(|| format!("Invalid best buy day: {}", args[2]))?,
            args[3]
                .parse()
                .with_context(|| format!("Invalid alert percentage: {}", args[3]))?,
        );
        app.save_goal(goal)?;
    }

    let goal = app.goal();
    let progress = app.goal_progress();
    println!("🎯 Meta mensal: {}", format_currency(goal.goal));
    println!("   Fechamento dia {} · melhor dia de compra {}", goal.due_date, goal.best_buy_date);
    println!("   Alerta em {}%", goal.alert_percentage);
    println!(
        "   Gasto em {}: {} ({:.1}%, restam {})",
        progress.month,
        format_currency(progress.monthly_total),
        progress.progress,
        format_currency(progress.remaining)
    );

    Ok(())
}

fn run_learn(app: &mut AppState, args: &[String]) -> Result<()> {
    let (Some(name), Some(category)) = (args.first(), args.get(1)) else {
        bail!("Usage: konomiza learn <name> <category> [subcategory]");
    };

    let rewritten = app.learn(name, category, args.get(2).map(String::as_str));
    println!("🧠 \"{}\" → {} ({} transações atualizadas)", name, category, rewritten);
    Ok(())
}

async fn run_ask(app: &mut AppState, args: &[String]) -> Result<()> {
    let question = args.join(" ");
    if !app.has_text_service() {
        tracing::debug!("no assistant service configured, using local answers");
    }

    let answer = app.ask(&question).await;
    println!("🤖 {}", answer);
    Ok(())
}
