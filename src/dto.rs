use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::AccountStatus;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOp {
    Open,
    Deposit,
    Withdraw,
    Transfer,
    Refund,
    Disable,
    Snapshot,
}

/// One line of an operation script. Accounts, users and transfers are named
/// by labels local to the script.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScriptRow {
    pub op: ScriptOp,
    pub user: String,
    pub account: Option<String>,
    pub counterparty: Option<String>,
    pub amount: Option<Decimal>,
    /// Names a transfer so that a later refund row can point at it.
    pub reference: Option<String>,
}

/// Final state of one scripted account.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BalanceRow {
    pub account: String,
    pub owner: String,
    pub status: AccountStatus,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse_csv_row(row: &str) -> Result<ScriptRow, csv::Error> {
        let data_with_header = format!("op,user,account,counterparty,amount,reference\n{}", row);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data_with_header.as_bytes());
        reader.deserialize().next().unwrap()
    }

    #[test]
    fn test_parse_transfer() {
        assert_eq!(
            parse_csv_row("transfer, alice, x, y, 30.00, t1").unwrap(),
            ScriptRow {
                op: ScriptOp::Transfer,
                user: "alice".to_string(),
                account: Some("x".to_string()),
                counterparty: Some("y".to_string()),
                amount: Some(dec!(30.00)),
                reference: Some("t1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_open_leaves_optional_fields_empty() {
        assert_eq!(
            parse_csv_row("open,bob,savings,,,").unwrap(),
            ScriptRow {
                op: ScriptOp::Open,
                user: "bob".to_string(),
                account: Some("savings".to_string()),
                counterparty: None,
                amount: None,
                reference: None,
            }
        );
    }

    #[test]
    fn test_parse_refund_by_reference() {
        let row = parse_csv_row("refund,alice,,,,t1").unwrap();
        assert_eq!(row.op, ScriptOp::Refund);
        assert_eq!(row.reference.as_deref(), Some("t1"));
        assert_eq!(row.account, None);
    }

    #[test]
    fn test_parse_invalid_amount_format() {
        assert!(parse_csv_row("deposit,alice,x,,abc,").is_err());
    }

    #[test]
    fn test_parse_unknown_op() {
        assert!(parse_csv_row("chargeback,alice,x,,1.0,").is_err());
    }

    #[test]
    fn test_balance_row_header() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .serialize(BalanceRow {
                account: "x".to_string(),
                owner: "alice".to_string(),
                status: AccountStatus::Inactive,
                balance: dec!(1.5),
            })
            .unwrap();
        let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(output, "account,owner,status,balance\nx,alice,inactive,1.5\n");
    }
}
