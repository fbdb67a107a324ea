//! CSV serialization utilities.

use serde::Serialize;
use std::io::Write;

/// Writes an iterator of records to a CSV writer.
/// Each record must implement Serialize.
pub fn write_csv<T, W>(writer: W, records: impl Iterator<Item = T>) -> csv::Result<()>
where
    T: Serialize,
    W: Write,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::BalanceRow;
    use crate::model::AccountStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_csv() -> csv::Result<()> {
        let rows = vec![
            BalanceRow {
                account: "a".to_string(),
                owner: "u1".to_string(),
                status: AccountStatus::Active,
                balance: dec!(100),
            },
            BalanceRow {
                account: "b".to_string(),
                owner: "u2".to_string(),
                status: AccountStatus::Inactive,
                balance: dec!(0),
            },
        ];

        let mut output = Vec::new();
        write_csv(&mut output, rows.into_iter())?;
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,owner,status,balance\na,u1,active,100\nb,u2,inactive,0\n"
        );
        Ok(())
    }

    #[test]
    fn test_write_csv_empty_writes_nothing() -> csv::Result<()> {
        let mut output = Vec::new();
        write_csv(&mut output, std::iter::empty::<BalanceRow>())?;
        assert!(output.is_empty());
        Ok(())
    }
}
