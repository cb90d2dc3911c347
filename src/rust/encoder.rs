use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, PredictionError};

/// The categorical features understood by the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Customer,
    Product,
    Category,
    FavoriteCategory,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Customer,
        Field::Product,
        Field::Category,
        Field::FavoriteCategory,
    ];

    /// Column name used in the dataset, the encoder file and request bodies
    pub fn column(self) -> &'static str {
        match self {
            Field::Customer => "CustomerName",
            Field::Product => "ProductName",
            Field::Category => "CategoryName",
            Field::FavoriteCategory => "FavoriteCategory",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Bidirectional mapping between a label and its dense integer code.
///
/// Codes are positions in the sorted list of distinct labels, which is the
/// convention used by scikit-learn's `LabelEncoder`, so a table fitted here
/// agrees with one exported from a training notebook.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    field: Field,
    classes: Vec<String>,
    codes: HashMap<String, i64>,
}

impl LabelEncoder {
    /// Builds a table from an exported class list, where each label's code is its index.
    pub fn from_classes(field: Field, classes: Vec<String>) -> Result<Self, DatasetError> {
        let mut codes = HashMap::with_capacity(classes.len());
        for (code, label) in classes.iter().enumerate() {
            if codes.insert(label.clone(), code as i64).is_some() {
                return Err(DatasetError::DuplicateLabel {
                    field,
                    label: label.clone(),
                });
            }
        }
        Ok(Self { field, classes, codes })
    }

    /// Fits a table on observed values: distinct labels, sorted.
    pub fn fit<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let distinct: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        let classes: Vec<String> = distinct.into_iter().collect();
        let codes = classes
            .iter()
            .enumerate()
            .map(|(code, label)| (label.clone(), code as i64))
            .collect();
        Self { field, classes, codes }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn transform(&self, label: &str) -> Result<i64, PredictionError> {
        self.codes
            .get(label)
            .copied()
            .ok_or_else(|| PredictionError::UnknownCategoricalValue {
                field: self.field,
                value: label.to_string(),
            })
    }

    pub fn inverse_transform(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|index| self.classes.get(index))
            .map(String::as_str)
    }
}

/// On-disk form of the four encoder tables, keyed by column name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderFile {
    #[serde(rename = "CustomerName")]
    pub customer: Vec<String>,
    #[serde(rename = "ProductName")]
    pub product: Vec<String>,
    #[serde(rename = "CategoryName")]
    pub category: Vec<String>,
    #[serde(rename = "FavoriteCategory")]
    pub favorite_category: Vec<String>,
}

/// The four category tables used by the pipeline.
#[derive(Debug, Clone)]
pub struct Encoders {
    customer: LabelEncoder,
    product: LabelEncoder,
    category: LabelEncoder,
    favorite_category: LabelEncoder,
}

impl Encoders {
    pub fn new(
        customer: LabelEncoder,
        product: LabelEncoder,
        category: LabelEncoder,
        favorite_category: LabelEncoder,
    ) -> Self {
        Self {
            customer,
            product,
            category,
            favorite_category,
        }
    }

    pub fn from_file_contents(file: EncoderFile) -> Result<Self, DatasetError> {
        Ok(Self {
            customer: LabelEncoder::from_classes(Field::Customer, file.customer)?,
            product: LabelEncoder::from_classes(Field::Product, file.product)?,
            category: LabelEncoder::from_classes(Field::Category, file.category)?,
            favorite_category: LabelEncoder::from_classes(
                Field::FavoriteCategory,
                file.favorite_category,
            )?,
        })
    }

    /// Loads the exported class lists from a JSON encoder file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        info!("Loading encoders from {:?}", path);
        let contents = fs::read_to_string(path)?;
        let file: EncoderFile = serde_json::from_str(&contents)?;
        let encoders = Self::from_file_contents(file)?;
        for field in Field::ALL {
            info!("  {}: {} labels", field, encoders.table(field).len());
        }
        Ok(encoders)
    }

    pub fn to_file_contents(&self) -> EncoderFile {
        EncoderFile {
            customer: self.customer.classes().to_vec(),
            product: self.product.classes().to_vec(),
            category: self.category.classes().to_vec(),
            favorite_category: self.favorite_category.classes().to_vec(),
        }
    }

    pub fn table(&self, field: Field) -> &LabelEncoder {
        match field {
            Field::Customer => &self.customer,
            Field::Product => &self.product,
            Field::Category => &self.category,
            Field::FavoriteCategory => &self.favorite_category,
        }
    }

    pub fn encode(&self, field: Field, label: &str) -> Result<i64, PredictionError> {
        self.table(field).transform(label)
    }

    pub fn decode(&self, field: Field, code: i64) -> Option<&str> {
        self.table(field).inverse_transform(code)
    }
}
