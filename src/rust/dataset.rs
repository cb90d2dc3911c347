use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::encoder::{Encoders, Field, LabelEncoder};
use crate::error::DatasetError;

/// One row of the historical sales export, as it appears in the CSV file.
///
/// Columns other than these are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawRecord {
    #[serde(rename = "CustomerName")]
    pub customer: String,
    #[serde(rename = "CategoryName")]
    pub category: String,
    #[serde(rename = "ProductName")]
    pub product: String,
    #[serde(rename = "Price")]
    pub price: f32,
    #[serde(rename = "Cost")]
    pub cost: f32,
    #[serde(rename = "FavoriteCategory")]
    pub favorite_category: String,
}

/// A historical row with every categorical column replaced by its code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalRecord {
    pub customer: i64,
    pub category: i64,
    pub product: i64,
    pub price: f32,
    pub cost: f32,
    pub favorite_category: i64,
}

impl HistoricalRecord {
    pub fn code(&self, field: Field) -> i64 {
        match field {
            Field::Customer => self.customer,
            Field::Product => self.product,
            Field::Category => self.category,
            Field::FavoriteCategory => self.favorite_category,
        }
    }
}

/// Reads raw records from a CSV file stored in the given text encoding.
///
/// `encoding` is a WHATWG label such as `windows-1252` or `utf-8`.
pub fn read_raw_records<P: AsRef<Path>>(path: P, encoding: &str) -> Result<Vec<RawRecord>, DatasetError> {
    let path = path.as_ref();
    let encoding = Encoding::for_label(encoding.as_bytes())
        .ok_or_else(|| DatasetError::UnknownEncoding(encoding.to_string()))?;

    info!("Reading historical records from {:?} ({})", path, encoding.name());
    let bytes = fs::read(path)?;
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!("Malformed {} sequences in {:?} were replaced", encoding.name(), path);
    }
    parse_raw_records(&text)
}

/// Parses raw records from CSV text with a header row
pub fn parse_raw_records(text: &str) -> Result<Vec<RawRecord>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let records = reader
        .deserialize::<RawRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    debug!("Parsed {} raw records", records.len());
    Ok(records)
}

/// Fits the four encoder tables on a set of raw records.
pub fn fit_encoders(records: &[RawRecord]) -> Encoders {
    Encoders::new(
        LabelEncoder::fit(Field::Customer, records.iter().map(|r| r.customer.as_str())),
        LabelEncoder::fit(Field::Product, records.iter().map(|r| r.product.as_str())),
        LabelEncoder::fit(Field::Category, records.iter().map(|r| r.category.as_str())),
        LabelEncoder::fit(
            Field::FavoriteCategory,
            records.iter().map(|r| r.favorite_category.as_str()),
        ),
    )
}

/// Loads the historical records and the encoder tables that go with them.
///
/// Exported encoders are used when `encoders_path` points to an existing file;
/// otherwise the tables are fitted on the records themselves.
pub fn load_dataset<P: AsRef<Path>>(
    path: P,
    encoding: &str,
    encoders_path: Option<&Path>,
) -> Result<(Encoders, HistoricalTable), DatasetError> {
    let raw = read_raw_records(path, encoding)?;
    let encoders = match encoders_path {
        Some(encoders_path) if encoders_path.exists() => Encoders::load(encoders_path)?,
        _ => {
            info!("No encoder file found, fitting encoders on {} records", raw.len());
            fit_encoders(&raw)
        }
    };
    let table = HistoricalTable::encode(&raw, &encoders)?;
    info!(
        "Loaded {} historical records for {} customers",
        table.len(),
        table.customers().len()
    );
    Ok((encoders, table))
}

/// Read-only table of encoded historical records.
#[derive(Debug, Clone)]
pub struct HistoricalTable {
    records: Vec<HistoricalRecord>,
}

impl HistoricalTable {
    pub fn new(records: Vec<HistoricalRecord>) -> Result<Self, DatasetError> {
        if records.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { records })
    }

    /// Encodes raw records. Every categorical value must be known to `encoders`.
    pub fn encode(raw: &[RawRecord], encoders: &Encoders) -> Result<Self, DatasetError> {
        let encode = |row: usize, field: Field, value: &str| {
            encoders
                .encode(field, value)
                .map_err(|_| DatasetError::UnknownValue {
                    row: row + 1,
                    field,
                    value: value.to_string(),
                })
        };

        let records = raw
            .iter()
            .enumerate()
            .map(|(row, r)| {
                Ok(HistoricalRecord {
                    customer: encode(row, Field::Customer, &r.customer)?,
                    category: encode(row, Field::Category, &r.category)?,
                    product: encode(row, Field::Product, &r.product)?,
                    price: r.price,
                    cost: r.cost,
                    favorite_category: encode(row, Field::FavoriteCategory, &r.favorite_category)?,
                })
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;

        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    /// Rows for a customer and category, optionally narrowed to one product, in file order
    pub fn matching(
        &self,
        customer: i64,
        category: i64,
        product: Option<i64>,
    ) -> impl Iterator<Item = &HistoricalRecord> {
        self.records.iter().filter(move |r| {
            r.customer == customer
                && r.category == category
                && product.map_or(true, |p| r.product == p)
        })
    }

    pub fn for_customer(&self, customer: i64) -> impl Iterator<Item = &HistoricalRecord> {
        self.records.iter().filter(move |r| r.customer == customer)
    }

    /// Distinct customer codes in order of first appearance
    pub fn customers(&self) -> Vec<i64> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.customer))
            .map(|r| r.customer)
            .collect()
    }

    /// Distinct codes present in the table for one column, ascending
    pub fn distinct_codes(&self, field: Field) -> BTreeSet<i64> {
        self.records.iter().map(|r| r.code(field)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
OrderID,CustomerName,CategoryName,ProductName,Price,Cost,FavoriteCategory
1,Béatrice Ben Salah,Café en grains entiers,Light Roast Sumatra,16.49,8,Café moulu
2,Amine,Thé,Earl Grey,5.5,2.25,Thé
3,Béatrice Ben Salah,Café en grains entiers,Dark Roast Java,18.0,9.5,Café moulu
";

    #[test]
    fn test_parse_ignores_extra_columns() {
        let raw = parse_raw_records(CSV).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0].customer, "Béatrice Ben Salah");
        assert_eq!(raw[0].price, 16.49);
        assert_eq!(raw[1].cost, 2.25);
    }

    #[test]
    fn test_encode_and_query() {
        let raw = parse_raw_records(CSV).unwrap();
        let encoders = fit_encoders(&raw);
        let table = HistoricalTable::encode(&raw, &encoders).unwrap();

        let beatrice = encoders.encode(Field::Customer, "Béatrice Ben Salah").unwrap();
        let coffee = encoders.encode(Field::Category, "Café en grains entiers").unwrap();
        assert_eq!(table.matching(beatrice, coffee, None).count(), 2);

        let java = encoders.encode(Field::Product, "Dark Roast Java").unwrap();
        let rows: Vec<_> = table.matching(beatrice, coffee, Some(java)).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 18.0);

        assert_eq!(table.customers(), vec![beatrice, encoders.encode(Field::Customer, "Amine").unwrap()]);
        assert_eq!(table.distinct_codes(Field::Product).len(), 3);
    }

    #[test]
    fn test_encode_rejects_unknown_values() {
        let raw = parse_raw_records(CSV).unwrap();
        let encoders = fit_encoders(&raw[..1]);
        let err = HistoricalTable::encode(&raw, &encoders).unwrap_err();
        assert!(matches!(err, DatasetError::UnknownValue { row: 2, .. }));
    }

    #[test]
    fn test_empty_table_is_rejected() {
        assert!(matches!(HistoricalTable::new(Vec::new()), Err(DatasetError::Empty)));
    }

    #[test]
    fn test_read_windows_1252() {
        // "Café" with é encoded as a single 0xE9 byte
        let mut bytes = b"CustomerName,CategoryName,ProductName,Price,Cost,FavoriteCategory\nZo".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b",Caf");
        bytes.push(0xE9);
        bytes.extend_from_slice(b",Espresso,3.5,1,Caf");
        bytes.push(0xE9);
        bytes.push(b'\n');

        let path = std::env::temp_dir().join("salescast-test-cp1252.csv");
        fs::write(&path, &bytes).unwrap();
        let raw = read_raw_records(&path, "windows-1252").unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(raw[0].customer, "Zoé");
        assert_eq!(raw[0].category, "Café");
    }

    #[test]
    fn test_unknown_encoding_label() {
        let result = read_raw_records("does-not-matter.csv", "no-such-encoding");
        assert!(matches!(result, Err(DatasetError::UnknownEncoding(_))));
    }
}
