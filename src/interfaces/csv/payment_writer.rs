use crate::domain::payment::Payment;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct PaymentRow<'a> {
    payment: String,
    worker: u32,
    payer: u32,
    date: String,
    amount: String,
    currency: &'a str,
    score: u8,
    status: &'static str,
}

/// Writes the payment report:
/// `payment,worker,payer,date,amount,currency,score,status`.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the payments ordered by date, then worker.
    pub fn write_payments(&mut self, mut payments: Vec<Payment>) -> Result<()> {
        payments.sort_by_key(|p| (p.date, p.worker));
        for payment in &payments {
            self.writer.serialize(PaymentRow {
                payment: payment.id.to_string(),
                worker: payment.worker.0,
                payer: payment.payer.0,
                date: payment.date.to_string(),
                amount: payment.amount.to_string(),
                currency: &payment.currency,
                score: payment.score,
                status: payment.status.as_str(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Amount, PayerId};
    use crate::domain::worker::WorkerId;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_writer_orders_rows_and_writes_header() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap();
        let payments = [2, 1]
            .into_iter()
            .map(|w| {
                Payment::new(
                    WorkerId(w),
                    PayerId(10),
                    date,
                    Amount::new(dec!(120.50)).unwrap(),
                    "USD",
                    90,
                    now,
                    Duration::hours(1),
                )
            })
            .collect();

        let mut out = Vec::new();
        PaymentWriter::new(&mut out).write_payments(payments).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "payment,worker,payer,date,amount,currency,score,status");
        assert!(lines[1].contains(",1,10,2026-10-19,120.50,USD,90,pending"));
        assert!(lines[2].contains(",2,10,2026-10-19,120.50,USD,90,pending"));
    }
}
