// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Renders MySQL values as CSV field text.
//!
//! Full-table reads use the text protocol, where every non-NULL value arrives
//! as bytes already formatted by the server. The other variants only show up
//! through the binary protocol and are printed the way MySQL would print them.

use base64::{engine::general_purpose, Engine as _};
use mysql::consts::ColumnType;
use mysql::Value;

/// Collation id MySQL reports for binary strings.
const BINARY_CHARSET: u16 = 63;

/// Whether values of a column are raw bytes (BLOB, BINARY, VARBINARY, BIT,
/// GEOMETRY) rather than text.
///
/// Numeric and temporal columns also report the binary charset, so the
/// column type is checked as well.
pub fn is_binary_column(column_type: ColumnType, character_set: u16) -> bool {
    character_set == BINARY_CHARSET
        && matches!(
            column_type,
            ColumnType::MYSQL_TYPE_TINY_BLOB
                | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
                | ColumnType::MYSQL_TYPE_LONG_BLOB
                | ColumnType::MYSQL_TYPE_BLOB
                | ColumnType::MYSQL_TYPE_VAR_STRING
                | ColumnType::MYSQL_TYPE_VARCHAR
                | ColumnType::MYSQL_TYPE_STRING
                | ColumnType::MYSQL_TYPE_BIT
                | ColumnType::MYSQL_TYPE_GEOMETRY
        )
}

/// `None` for SQL NULL. Every value of a binary column is Base64-encoded;
/// text columns are decoded as UTF-8.
pub fn value_to_text(value: Value, binary: bool) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) if binary => Some(general_purpose::STANDARD.encode(bytes)),
        Value::Bytes(bytes) => Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }),
        Value::Int(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::Float(n) => Some(n.to_string()),
        Value::Double(n) => Some(n.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => Some(format_datetime(
            year, month, day, hour, minute, second, micros,
        )),
        Value::Time(negative, days, hours, minutes, seconds, micros) => Some(format_time(
            negative, days, hours, minutes, seconds, micros,
        )),
    }
}

fn format_datetime(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> String {
    let date = format!("{:04}-{:02}-{:02}", year, month, day);
    if hour == 0 && minute == 0 && second == 0 && micros == 0 {
        return date;
    }
    let time = format!("{} {:02}:{:02}:{:02}", date, hour, minute, second);
    if micros == 0 {
        time
    } else {
        format!("{}.{:06}", time, micros)
    }
}

fn format_time(negative: bool, days: u32, hours: u8, minutes: u8, seconds: u8, micros: u32) -> String {
    let total_hours = u64::from(days) * 24 + u64::from(hours);
    let sign = if negative { "-" } else { "" };
    let base = format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds);
    if micros == 0 {
        base
    } else {
        format!("{}.{:06}", base, micros)
    }
}
