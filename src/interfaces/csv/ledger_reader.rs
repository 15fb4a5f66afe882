use crate::domain::account::{PayerAccount, PayerId};
use crate::error::{Result, ShiftpayError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct LedgerRow {
    payer: u32,
    available: Decimal,
}

/// Reads opening payer balances (`payer,available`).
pub struct LedgerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LedgerReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    pub fn accounts(self) -> impl Iterator<Item = Result<PayerAccount>> {
        self.reader.into_deserialize::<LedgerRow>().map(|row| {
            let row = row?;
            if row.available.is_sign_negative() {
                return Err(ShiftpayError::Validation(format!(
                    "payer {} has a negative opening balance",
                    row.payer
                )));
            }
            Ok(PayerAccount::with_balance(PayerId(row.payer), row.available))
        })
    }
}
