use crate::domain::account::{Account, AccountStatus, Balance};
use crate::error::Result;
use std::io::Write;

/// Writes the final balance report as CSV: one row per account, sorted by
/// holder type and id so runs are diffable.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_balances(&mut self, mut rows: Vec<(Account, Balance)>) -> Result<()> {
        rows.sort_by_key(|(account, _)| (account.id.holder as u8, account.id.holder_id));

        self.writer
            .write_record(["holder", "holder_id", "balance", "status"])?;
        for (account, balance) in rows {
            let status = match account.status {
                AccountStatus::Active => "active",
                AccountStatus::Frozen => "frozen",
                AccountStatus::Closed => "closed",
            };
            self.writer.write_record([
                account.id.holder.to_string(),
                account.id.holder_id.to_string(),
                balance.to_string(),
                status.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountId;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_sorted_rows() {
        let mut out = Vec::new();
        let mut writer = BalanceWriter::new(&mut out);
        writer
            .write_balances(vec![
                (
                    Account::open(AccountId::agent(2)),
                    Balance::new(dec!(5.00)),
                ),
                (
                    Account::open(AccountId::customer(1)),
                    Balance::new(dec!(800.00)),
                ),
            ])
            .unwrap();

        drop(writer);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "holder,holder_id,balance,status");
        assert_eq!(lines[1], "customer,1,800.00,active");
        assert_eq!(lines[2], "agent,2,5.00,active");
    }
}
