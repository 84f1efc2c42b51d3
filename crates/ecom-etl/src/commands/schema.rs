//! `ecom-etl schema` command implementation

use crate::dialect::Dialect;

/// Print the DDL for every table
pub fn run(dialect: Dialect) -> anyhow::Result<()> {
    println!("-- {} schema", dialect);
    print!("{}", dialect.schema_script());
    Ok(())
}
