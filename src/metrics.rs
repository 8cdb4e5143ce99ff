//! Per-epoch training metrics

use crate::data::onecold;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Fraction of rows whose largest logit matches the target's hot index.
pub fn accuracy(logits: &[f32], targets: &[f32], classes: usize) -> f32 {
    let predicted = onecold(logits, classes);
    let expected = onecold(targets, classes);
    if predicted.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(expected.iter())
        .filter(|(p, e)| p == e)
        .count();
    correct as f32 / predicted.len() as f32
}

/// Loss and accuracy on the train and test sets, one entry per epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss_train: Vec<f32>,
    pub loss_test: Vec<f32>,
    pub acc_train: Vec<f32>,
    pub acc_test: Vec<f32>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, loss_train: f32, loss_test: f32, acc_train: f32, acc_test: f32) {
        self.loss_train.push(loss_train);
        self.loss_test.push(loss_test);
        self.acc_train.push(acc_train);
        self.acc_test.push(acc_test);
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.loss_train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss_train.is_empty()
    }

    /// Render the history as a fixed-width text table, rounding to `digits`.
    pub fn to_table(&self, digits: usize) -> String {
        let width = digits + 6;
        let mut table = String::new();
        let _ = writeln!(
            table,
            "{:>5} | {:>w$} | {:>w$} | {:>w$} | {:>w$}",
            "epoch",
            "loss_train",
            "loss_test",
            "acc_train",
            "acc_test",
            w = width
        );
        let _ = writeln!(table, "{}", "-".repeat(5 + 4 * (width + 3)));
        for epoch in 0..self.len() {
            let _ = writeln!(
                table,
                "{:>5} | {:>w$.d$} | {:>w$.d$} | {:>w$.d$} | {:>w$.d$}",
                epoch + 1,
                self.loss_train[epoch],
                self.loss_test[epoch],
                self.acc_train[epoch],
                self.acc_test[epoch],
                w = width,
                d = digits
            );
        }
        table
    }

    /// Write the history as CSV with a header row, creating parent directories.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut csv = String::from("epoch,loss_train,loss_test,acc_train,acc_test\n");
        for epoch in 0..self.len() {
            let _ = writeln!(
                csv,
                "{},{},{},{},{}",
                epoch + 1,
                self.loss_train[epoch],
                self.loss_test[epoch],
                self.acc_train[epoch],
                self.acc_test[epoch]
            );
        }
        fs::write(path, csv)?;
        Ok(())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
