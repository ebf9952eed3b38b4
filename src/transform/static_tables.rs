use rusqlite::types::Value;
use rusqlite::Connection;

use super::insert_rows;
use crate::constants::{FUEL_TYPES, PRIME_MOVERS};
use crate::error::Result;
use crate::tables::IntegratedTable;

fn code_rows(codes: &[(&str, &str)]) -> Vec<Vec<Value>> {
    codes
        .iter()
        .map(|(code, description)| vec![Value::Text(code.to_string()), Value::Text(description.to_string())])
        .collect()
}

pub(crate) fn load_fuel_types(conn: &Connection) -> Result<u64> {
    insert_rows(
        conn,
        IntegratedTable::FuelTypes,
        &["fuel_type_code_pudl", "description"],
        &code_rows(FUEL_TYPES),
    )
}

pub(crate) fn load_prime_movers(conn: &Connection) -> Result<u64> {
    insert_rows(
        conn,
        IntegratedTable::PrimeMovers,
        &["prime_mover_code", "description"],
        &code_rows(PRIME_MOVERS),
    )
}
