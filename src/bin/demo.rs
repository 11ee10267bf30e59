use std::env;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use relops::catalog::{AttType, Schema};
use relops::executor::{AggType, Aggregate, BPlusSelection, RegularSelection, SortMergeJoin};
use relops::storage::{AttVal, BPlusTreeIndex, BufferManager, Table};
use relops::ExecConfig;

struct Args {
    config: Option<String>,
    rows: usize,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        config: None,
        rows: 20,
    };

    // Simple argument parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                parsed.config = Some(args.get(i + 1).context("--config needs a path")?.clone());
                i += 1;
            }
            "--rows" | "-n" => {
                let value = args.get(i + 1).context("--rows needs a number")?;
                parsed.rows = value
                    .parse()
                    .with_context(|| format!("invalid row count '{}'", value))?;
                i += 1;
            }
            other => bail!("unknown argument '{}'", other),
        }
        i += 1;
    }
    Ok(parsed)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_table(table: &Table) -> Result<()> {
    println!("-- {} ({})", table.name(), table.schema().names().join(", "));
    for row in table.rows()? {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("   {}", cells.join(" | "));
    }
    Ok(())
}

fn orders(bpm: &Rc<BufferManager>, rows: usize) -> Result<Table> {
    let schema = Schema::from_atts([
        ("o_orderkey", AttType::Int),
        ("o_custkey", AttType::Int),
        ("o_total", AttType::Double),
    ]);
    let mut table = Table::new("orders", schema, bpm.clone());
    for i in 0..rows as i64 {
        table.insert_values(vec![
            AttVal::Int(i),
            AttVal::Int(i % 4),
            AttVal::Double((i * 13 % 50) as f64 + 0.5),
        ])?;
    }
    Ok(table)
}

fn customers(bpm: &Rc<BufferManager>) -> Result<Table> {
    let schema = Schema::from_atts([("c_custkey", AttType::Int), ("c_name", AttType::String)]);
    let mut table = Table::new("customers", schema, bpm.clone());
    for (key, name) in [(0, "alice"), (1, "bob"), (2, "carol"), (3, "dave"), (5, "erin")] {
        table.insert_values(vec![AttVal::Int(key), AttVal::from(name)])?;
    }
    Ok(table)
}

fn main() -> Result<()> {
    init_logging();
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => ExecConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => ExecConfig::default(),
    };
    let bpm = BufferManager::new(config)?;

    let orders = orders(&bpm, args.rows)?;
    let customers = customers(&bpm)?;

    // Selection: large orders
    let mut big = Table::new(
        "big_orders",
        Schema::from_atts([("orderkey", AttType::Int), ("total", AttType::Double)]),
        bpm.clone(),
    );
    RegularSelection::new(
        &orders,
        &mut big,
        "> ([o_total], double[30.0])",
        vec!["[o_orderkey]".into(), "[o_total]".into()],
    )
    .run()?;
    print_table(&big)?;

    // Index range selection: orders of customers 1..=2
    let index = BPlusTreeIndex::new(orders, "o_custkey")?;
    let mut ranged = Table::new(
        "orders_cust_1_2",
        Schema::from_atts([("orderkey", AttType::Int), ("custkey", AttType::Int)]),
        bpm.clone(),
    );
    BPlusSelection::new(
        &index,
        &mut ranged,
        AttVal::Int(1),
        AttVal::Int(2),
        "bool[true]",
        vec!["[o_orderkey]".into(), "[o_custkey]".into()],
    )
    .run()?;
    print_table(&ranged)?;
    let orders = index.table();

    // Aggregation: per-customer totals
    let mut per_customer = Table::new(
        "per_customer",
        Schema::from_atts([
            ("custkey", AttType::Int),
            ("sum_total", AttType::Double),
            ("orders", AttType::Int),
            ("avg_total", AttType::Double),
        ]),
        bpm.clone(),
    );
    Aggregate::new(
        orders,
        &mut per_customer,
        vec![
            (AggType::Sum, "[o_total]".into()),
            (AggType::Count, "int[1]".into()),
            (AggType::Avg, "[o_total]".into()),
        ],
        vec!["[o_custkey]".into()],
        "bool[true]",
    )
    .run()?;
    print_table(&per_customer)?;

    // Join: customer names for every order
    let mut named = Table::new(
        "named_orders",
        Schema::from_atts([("orderkey", AttType::Int), ("name", AttType::String)]),
        bpm.clone(),
    );
    SortMergeJoin::new(
        orders,
        &customers,
        &mut named,
        "bool[true]",
        vec!["[o_orderkey]".into(), "[c_name]".into()],
        ("[o_custkey]".into(), "[c_custkey]".into()),
        "bool[true]",
        "bool[true]",
    )
    .run()?;
    print_table(&named)?;

    if named.rows()?.len() != args.rows {
        bail!("every order should have matched exactly one customer");
    }
    Ok(())
}
