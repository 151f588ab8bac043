//! Manual smoke-testing driver over the `Database` facade.
//!
//! Usage:
//!   storage_cli <db_path> create_table <name> <col:type>...
//!   storage_cli <db_path> create_index <table> <index_name> <col>...
//!   storage_cli <db_path> insert <table> <value>...
//!   storage_cli <db_path> scan <table>
//!   storage_cli <db_path> stats
//!
//! Column specs are `name:int32`, `name:float32`, or `name:char:<len>`.

use btree_storage::record::{Column, Field, FieldType, Row, Schema};
use btree_storage::{Config, Database};
use std::env;
use std::process::exit;

fn parse_column(spec: &str, index: u32) -> Column {
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [name, "int32"] => Column::new(*name, FieldType::Int32, index, true, false),
        [name, "float32"] => Column::new(*name, FieldType::Float32, index, true, false),
        [name, "char", len] => {
            let len: u32 = len.parse().unwrap_or_else(|_| {
                eprintln!("ERROR: bad char length in column spec '{spec}'");
                exit(1);
            });
            Column::new_char(*name, len, index, true, false)
        }
        _ => {
            eprintln!("ERROR: bad column spec '{spec}' (want name:int32 | name:float32 | name:char:<len>)");
            exit(1);
        }
    }
}

fn parse_field(raw: &str, column: &Column) -> Field {
    if raw == "NULL" {
        return Field::Null;
    }
    match column.column_type {
        FieldType::Int32 => Field::Int32(raw.parse().unwrap_or_else(|_| {
            eprintln!("ERROR: '{raw}' is not a valid int32 for column '{}'", column.name);
            exit(1);
        })),
        FieldType::Float32 => Field::Float32(raw.parse().unwrap_or_else(|_| {
            eprintln!("ERROR: '{raw}' is not a valid float32 for column '{}'", column.name);
            exit(1);
        })),
        FieldType::Char => Field::Char(raw.to_string()),
    }
}

fn format_field(field: &Field) -> String {
    match field {
        Field::Null => "NULL".to_string(),
        Field::Int32(v) => v.to_string(),
        Field::Float32(v) => v.to_string(),
        Field::Char(s) => s.clone(),
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: storage_cli <db_path> <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  create_table <name> <col:type>...");
        eprintln!("  create_index <table> <index_name> <col>...");
        eprintln!("  insert <table> <value>...");
        eprintln!("  scan <table>");
        eprintln!("  stats");
        exit(1);
    }

    let db_path = &args[1];
    let command = &args[2];
    let config = Config::new(db_path);
    let db = match Database::open(config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("ERROR: failed to open database: {e}");
            exit(1);
        }
    };

    match command.as_str() {
        "create_table" => {
            if args.len() < 5 {
                eprintln!("Usage: storage_cli <db_path> create_table <name> <col:type>...");
                exit(1);
            }
            let name = &args[3];
            let columns: Vec<Column> = args[4..]
                .iter()
                .enumerate()
                .map(|(i, spec)| parse_column(spec, i as u32))
                .collect();
            match db.create_table(name, Schema::new(columns)) {
                Ok(_) => println!("OK"),
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            }
        }

        "create_index" => {
            if args.len() < 6 {
                eprintln!("Usage: storage_cli <db_path> create_index <table> <index_name> <col>...");
                exit(1);
            }
            let table = &args[3];
            let index_name = &args[4];
            let columns: Vec<&str> = args[5..].iter().map(String::as_str).collect();
            match db.create_index(table, index_name, &columns) {
                Ok(_) => println!("OK"),
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            }
        }

        "insert" => {
            if args.len() < 4 {
                eprintln!("Usage: storage_cli <db_path> insert <table> <value>...");
                exit(1);
            }
            let table_name = &args[3];
            let table = match db.get_table(table_name) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            };
            let raw_values = &args[4..];
            if raw_values.len() != table.schema.column_count() {
                eprintln!(
                    "ERROR: table '{table_name}' has {} columns, got {} values",
                    table.schema.column_count(),
                    raw_values.len()
                );
                exit(1);
            }
            let fields: Vec<Field> = raw_values
                .iter()
                .zip(table.schema.columns.iter())
                .map(|(raw, col)| parse_field(raw, col))
                .collect();
            let row = Row::new(fields);
            let mut buf = Vec::new();
            if let Err(e) = row.serialize_to(&table.schema, &mut buf) {
                eprintln!("ERROR: {e}");
                exit(1);
            }
            match table.heap.insert_tuple(&buf) {
                Ok(rid) => {
                    for index in db.get_table_indexes(table_name).unwrap_or_default() {
                        if let Ok(key) = index.encode_key(&row) {
                            let _ = index.insert(&key, rid);
                        }
                    }
                    println!("OK rid={rid}");
                }
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            }
        }

        "scan" => {
            if args.len() < 4 {
                eprintln!("Usage: storage_cli <db_path> scan <table>");
                exit(1);
            }
            let table_name = &args[3];
            let table = match db.get_table(table_name) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            };
            let mut iter = match table.heap.begin() {
                Ok(it) => it,
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            };
            let mut count = 0;
            while let Some((rid, bytes)) = iter.current().unwrap_or(None) {
                match Row::deserialize(&bytes, &table.schema) {
                    Ok(row) => {
                        let rendered: Vec<String> = row.fields.iter().map(format_field).collect();
                        println!("{rid} {}", rendered.join(" | "));
                        count += 1;
                    }
                    Err(e) => eprintln!("ERROR decoding row at {rid}: {e}"),
                }
                if iter.advance().is_err() {
                    break;
                }
            }
            println!("COUNT: {count}");
        }

        "stats" => match db.stats() {
            Ok(stats) => {
                println!("page_count: {}", stats.page_count);
                println!("buffer_pool_size: {}", stats.buffer_pool_size);
                println!("buffer_pool_occupancy: {}", stats.buffer_pool_occupancy);
                println!("table_count: {}", stats.table_count);
                println!("index_count: {}", stats.index_count);
            }
            Err(e) => {
                eprintln!("ERROR: {e}");
                exit(1);
            }
        },

        _ => {
            eprintln!("Unknown command: {command}");
            exit(1);
        }
    }

    if let Err(e) = db.flush() {
        eprintln!("Warning: failed to flush: {e}");
    }
}
