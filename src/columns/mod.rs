//! Column aliasing for broker exports.
//!
//! Every broker names its columns differently ("Qtd Exec", "Quantidade",
//! "Quantity"...). Instead of positional templates per broker, each canonical
//! [`Field`] carries a list of aliases and a row's columns are matched against
//! them after normalization (lowercase, no diacritics, alphanumerics only).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::records::{CellValue, RawRow};

/// Aliases shorter than this only ever match exactly
pub const DEFAULT_SOFT_MATCH_MIN_LEN: usize = 3;

/// Canonical fields a trade row is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Date,
    Ticker,
    Side,
    Quantity,
    AvgPrice,
    Status,
    Timestamp,
    Volume,
    Account,
    Client,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Date,
        Field::Ticker,
        Field::Side,
        Field::Quantity,
        Field::AvgPrice,
        Field::Status,
        Field::Timestamp,
        Field::Volume,
        Field::Account,
        Field::Client,
    ];

    /// Fields a statement needs before any row can become a trade
    pub const REQUIRED: [Field; 5] = [
        Field::Date,
        Field::Ticker,
        Field::Side,
        Field::Quantity,
        Field::AvgPrice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Ticker => "ticker",
            Self::Side => "side",
            Self::Quantity => "quantity",
            Self::AvgPrice => "avgPrice",
            Self::Status => "status",
            Self::Timestamp => "timestamp",
            Self::Volume => "volume",
            Self::Account => "account",
            Self::Client => "client",
        }
    }

    /// Built-in header names, Portuguese and English broker exports
    pub fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Date => &["Data", "Date", "Data Pregão", "Data Negócio", "Trade Date", "Dt"],
            Self::Ticker => &[
                "Papel",
                "Ativo",
                "Ticker",
                "Symbol",
                "Símbolo",
                "Código",
                "Instrumento",
                "Asset",
            ],
            Self::Side => &[
                "C/V",
                "Side",
                "Lado",
                "Tipo",
                "Operação",
                "Natureza",
                "Compra/Venda",
                "Direction",
            ],
            Self::Quantity => &[
                "Qtd Exec",
                "Qtd",
                "Qtde",
                "Quantidade",
                "Qtd Executada",
                "Quantity",
                "Qty",
                "Executed Qty",
            ],
            Self::AvgPrice => &[
                "Prc Médio",
                "Preço Médio",
                "Preço",
                "Price",
                "Avg Price",
                "Average Price",
                "PM",
            ],
            Self::Status => &["Status", "Situação", "Estado", "State"],
            Self::Timestamp => &[
                "Data/Hora",
                "Datetime",
                "Timestamp",
                "Hora",
                "Horário",
                "Data Execução",
                "Time",
            ],
            Self::Volume => &["Volume", "Financeiro", "Valor Financeiro", "Valor", "Total", "Notional"],
            Self::Account => &["Conta", "Account", "Número Conta", "Acct"],
            Self::Client => &["Cliente", "Client", "Nome Cliente", "Customer"],
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Key normalization
// ============================================================================

/// Lowercase, fold diacritics and drop everything that is not alphanumeric.
///
/// `"Prc. Médio"` and `"prc_medio"` both become `"prcmedio"`.
pub fn normalize_key(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(fold_diacritic)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ª' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'º' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Index of the column matching `aliases`, and whether it matched exactly.
///
/// Exact matches win over soft ones regardless of column order. A soft match
/// is the first column that contains an alias, or is contained in one, using
/// only aliases at least `min_soft_len` characters long. Columns whose name
/// normalizes to nothing (`#`, `--`) never soft-match.
fn match_column<'a>(
    keys: impl Iterator<Item = &'a str> + Clone,
    aliases: &[String],
    min_soft_len: usize,
) -> Option<(usize, bool)> {
    if let Some(index) = keys.clone().position(|key| aliases.iter().any(|a| a == key)) {
        return Some((index, true));
    }

    keys.enumerate()
        .find(|(_, key)| {
            !key.is_empty()
                && aliases
                    .iter()
                    .filter(|alias| alias.len() >= min_soft_len)
                    .any(|alias| key.contains(alias.as_str()) || alias.contains(key))
        })
        .map(|(index, _)| (index, false))
}

/// Value of the best-matching column for already-normalized `aliases`
pub fn find_value<'r>(row: &'r RawRow, aliases: &[String], min_soft_len: usize) -> Option<&'r CellValue> {
    let keys = row.columns().iter().map(|c| c.key.as_str());
    match_column(keys, aliases, min_soft_len).map(|(index, _)| &row.columns()[index].value)
}

/// Normalized aliases per field, built once per import
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: BTreeMap<Field, Vec<String>>,
    min_soft_len: usize,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new(&BTreeMap::new(), DEFAULT_SOFT_MATCH_MIN_LEN)
    }
}

impl AliasTable {
    /// Built-in aliases plus `extra` ones, which are tried after the built-ins
    pub fn new(extra: &BTreeMap<Field, Vec<String>>, min_soft_len: usize) -> Self {
        let mut aliases = BTreeMap::new();
        for field in Field::ALL {
            let mut list: Vec<String> = Vec::new();
            let builtin = field.default_aliases().iter().map(|a| normalize_key(a));
            let configured = extra
                .get(&field)
                .into_iter()
                .flatten()
                .map(|a| normalize_key(a));
            for alias in builtin.chain(configured) {
                if !alias.is_empty() && !list.contains(&alias) {
                    list.push(alias);
                }
            }
            aliases.insert(field, list);
        }
        Self { aliases, min_soft_len }
    }

    pub fn aliases(&self, field: Field) -> &[String] {
        self.aliases.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn min_soft_len(&self) -> usize {
        self.min_soft_len
    }

    pub fn find<'r>(&self, row: &'r RawRow, field: Field) -> Option<&'r CellValue> {
        find_value(row, self.aliases(field), self.min_soft_len)
    }

    /// True when `key` (normalized) is exactly one of the aliases of any field
    pub fn is_known_header(&self, key: &str) -> bool {
        self.aliases.values().any(|list| list.iter().any(|a| a == key))
    }

    /// Report which header each field resolves to
    pub fn resolve_headers(&self, headers: &[String]) -> HeaderReport {
        let keys: Vec<String> = headers.iter().map(|h| normalize_key(h)).collect();

        let fields: Vec<ResolvedField> = Field::ALL
            .iter()
            .map(|&field| {
                let found = match_column(keys.iter().map(String::as_str), self.aliases(field), self.min_soft_len);
                ResolvedField {
                    field,
                    column: found.map(|(index, _)| headers[index].clone()),
                    exact: found.map(|(_, exact)| exact).unwrap_or(false),
                }
            })
            .collect();

        let required_found = fields
            .iter()
            .filter(|f| Field::REQUIRED.contains(&f.field) && f.column.is_some())
            .count();
        let confidence = required_found as f32 / Field::REQUIRED.len() as f32;

        let missing_required = fields
            .iter()
            .filter(|f| Field::REQUIRED.contains(&f.field) && f.column.is_none())
            .map(|f| f.field)
            .collect();

        HeaderReport {
            fields,
            confidence,
            missing_required,
        }
    }
}

/// Where a single field was found in a header line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedField {
    pub field: Field,
    pub column: Option<String>,
    pub exact: bool,
}

/// Result of matching a header line against the alias table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderReport {
    pub fields: Vec<ResolvedField>,
    /// Share of required fields that resolved, 0.0 to 1.0
    pub confidence: f32,
    pub missing_required: Vec<Field>,
}
