use log::debug;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RequestError;

const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// A spreadsheet seen as named tables of text rows. Row 0 is the header.
pub trait Worksheets {
    /// Every row of the worksheet, or `None` when no worksheet has that title.
    fn rows(&self, title: &str) -> Result<Option<Vec<Vec<String>>>, RequestError>;

    /// Adds a worksheet holding only `header`.
    fn create(&self, title: &str, header: &[&str]) -> Result<(), RequestError>;

    fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<(), RequestError>;

    /// Empties the worksheet, header included.
    fn clear(&self, title: &str) -> Result<(), RequestError>;

    fn delete_row(&self, title: &str, index: usize) -> Result<(), RequestError>;
}

impl<W: Worksheets + ?Sized> Worksheets for &W {
    fn rows(&self, title: &str) -> Result<Option<Vec<Vec<String>>>, RequestError> {
        (**self).rows(title)
    }

    fn create(&self, title: &str, header: &[&str]) -> Result<(), RequestError> {
        (**self).create(title, header)
    }

    fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<(), RequestError> {
        (**self).append_rows(title, rows)
    }

    fn clear(&self, title: &str) -> Result<(), RequestError> {
        (**self).clear(title)
    }

    fn delete_row(&self, title: &str, index: usize) -> Result<(), RequestError> {
        (**self).delete_row(title, index)
    }
}

/// Rows of `title`, creating the worksheet with `header` when it does not exist yet.
pub(crate) fn rows_or_create<W: Worksheets>(
    sheets: &W,
    title: &str,
    header: &[&str],
) -> Result<Vec<Vec<String>>, RequestError> {
    match sheets.rows(title)? {
        Some(rows) => Ok(rows),
        None => {
            debug!("worksheet '{}' missing, creating it", title);
            sheets.create(title, header)?;
            Ok(vec![header.iter().map(|h| h.to_string()).collect()])
        }
    }
}

/// Google Sheets v4 REST client. Authentication is a ready-made bearer token.
#[derive(Clone)]
pub struct SheetsClient {
    agent: ureq::Agent,
    spreadsheet_id: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: &str, access_token: &str, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            agent: builder.build(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", SHEETS_URL, self.spreadsheet_id, path)
    }

    fn get(&self, url: &str) -> Result<ureq::Response, ureq::Error> {
        self.agent
            .get(url)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .call()
    }

    fn post(&self, url: &str, payload: &Value) -> Result<Value, RequestError> {
        let response = self
            .agent
            .post(url)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .set("Content-Type", "application/json")
            .send_json(payload)
            .map_err(status_error)?;

        Ok(response.into_json()?)
    }

    fn sheet_id(&self, title: &str) -> Result<i64, RequestError> {
        let response = self
            .get(&self.url("?fields=sheets.properties"))
            .map_err(status_error)?;
        let body: Value = response.into_json()?;

        body.get("sheets")
            .and_then(|s| s.as_array())
            .and_then(|sheets| {
                sheets.iter().find_map(|sheet| {
                    let properties = sheet.get("properties")?;
                    if properties.get("title")?.as_str()? == title {
                        properties.get("sheetId")?.as_i64()
                    } else {
                        None
                    }
                })
            })
            .ok_or_else(|| RequestError::Malformed(format!("no worksheet titled '{}'", title)))
    }
}

fn status_error(e: ureq::Error) -> RequestError {
    match e {
        ureq::Error::Status(code, _) => RequestError::ServerError { status: code },
        other => RequestError::Http(other),
    }
}

/// `true` when a call failed because the worksheet does not exist.
pub(crate) fn is_missing_sheet(e: &RequestError) -> bool {
    matches!(e, RequestError::ServerError { status: 400 })
}

/// A1 reference to a whole worksheet, quoted and ready for a URL path.
fn range(title: &str) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    urlencoding::encode(&quoted).into_owned()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Worksheets for SheetsClient {
    fn rows(&self, title: &str) -> Result<Option<Vec<Vec<String>>>, RequestError> {
        let url = self.url(&format!("/values/{}", range(title)));

        let response = match self.get(&url) {
            Ok(response) => response,
            // the API answers 400 "Unable to parse range" for unknown worksheets
            Err(ureq::Error::Status(400, _)) => return Ok(None),
            Err(e) => return Err(status_error(e)),
        };
        let body: Value = response.into_json()?;

        let rows = body
            .get("values")
            .and_then(|v| v.as_array())
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(cell_text).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(rows))
    }

    fn create(&self, title: &str, header: &[&str]) -> Result<(), RequestError> {
        let payload = json!({
            "requests": [{"addSheet": {"properties": {"title": title}}}]
        });
        self.post(&self.url(":batchUpdate"), &payload)?;

        let header: Vec<Vec<String>> = vec![header.iter().map(|h| h.to_string()).collect()];
        self.append_rows(title, &header)
    }

    fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<(), RequestError> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.url(&format!(
            "/values/{}!A1:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            range(title)
        ));
        self.post(&url, &json!({ "values": rows }))?;
        Ok(())
    }

    fn clear(&self, title: &str) -> Result<(), RequestError> {
        let url = self.url(&format!("/values/{}:clear", range(title)));
        self.post(&url, &json!({}))?;
        Ok(())
    }

    fn delete_row(&self, title: &str, index: usize) -> Result<(), RequestError> {
        let sheet_id = self.sheet_id(title)?;
        let payload = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": index,
                        "endIndex": index + 1
                    }
                }
            }]
        });
        self.post(&self.url(":batchUpdate"), &payload)?;
        Ok(())
    }
}

/// Worksheets held in memory, for offline runs and tests.
///
/// Can be switched unavailable to simulate an unreachable spreadsheet.
#[derive(Default)]
pub struct MemoryWorksheets {
    sheets: Mutex<BTreeMap<String, Vec<Vec<String>>>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryWorksheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of `rows` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Snapshot of a worksheet.
    pub fn snapshot(&self, title: &str) -> Option<Vec<Vec<String>>> {
        self.lock().get(title).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Vec<String>>>> {
        self.sheets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), RequestError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RequestError::ServerError { status: 503 })
        } else {
            Ok(())
        }
    }
}

impl Worksheets for MemoryWorksheets {
    fn rows(&self, title: &str) -> Result<Option<Vec<Vec<String>>>, RequestError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().get(title).cloned())
    }

    fn create(&self, title: &str, header: &[&str]) -> Result<(), RequestError> {
        self.check()?;
        self.lock().insert(
            title.to_string(),
            vec![header.iter().map(|h| h.to_string()).collect()],
        );
        Ok(())
    }

    fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<(), RequestError> {
        self.check()?;
        match self.lock().get_mut(title) {
            Some(existing) => existing.extend(rows.iter().cloned()),
            None => return Err(RequestError::ServerError { status: 400 }),
        }
        Ok(())
    }

    fn clear(&self, title: &str) -> Result<(), RequestError> {
        self.check()?;
        if let Some(rows) = self.lock().get_mut(title) {
            rows.clear();
        }
        Ok(())
    }

    fn delete_row(&self, title: &str, index: usize) -> Result<(), RequestError> {
        self.check()?;
        let mut sheets = self.lock();
        let rows = sheets
            .get_mut(title)
            .ok_or_else(|| RequestError::Malformed(format!("no worksheet titled '{}'", title)))?;
        if index >= rows.len() {
            return Err(RequestError::Malformed(format!(
                "row {} out of range in '{}'",
                index, title
            )));
        }
        rows.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_worksheet_is_created_with_its_header() {
        let sheets = MemoryWorksheets::new();

        let rows = rows_or_create(&sheets, "History", &["timestamp", "type"]).unwrap();

        assert_eq!(rows, vec![vec!["timestamp", "type"]]);
        assert_eq!(
            sheets.snapshot("History"),
            Some(vec![vec!["timestamp".to_string(), "type".to_string()]])
        );
    }

    #[test]
    fn unavailable_sheets_fail_every_call() {
        let sheets = MemoryWorksheets::new();
        sheets.set_available(false);

        assert!(sheets.rows("History").is_err());
        assert!(sheets.append_rows("History", &[vec!["x".into()]]).is_err());

        sheets.set_available(true);
        assert!(sheets.rows("History").unwrap().is_none());
    }

    #[test]
    fn ranges_are_quoted_and_encoded() {
        assert_eq!(range("History"), "%27History%27");
        assert_eq!(
            range("Questions_Earth Science"),
            "%27Questions_Earth%20Science%27"
        );
        assert_eq!(range("Bob's #1/2?"), "%27Bob%27%27s%20%231%2F2%3F%27");
    }

    #[test]
    fn appending_to_a_missing_worksheet_fails_as_missing() {
        let sheets = MemoryWorksheets::new();

        let err = sheets.append_rows("History", &[vec!["x".into()]]).unwrap_err();

        assert!(is_missing_sheet(&err));
        assert!(sheets.snapshot("History").is_none());
    }
}
