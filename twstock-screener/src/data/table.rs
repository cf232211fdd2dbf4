//! HTML table extraction.
//!
//! goodinfo pages render data as `<table>` elements with multi-row headers
//! (`colspan`/`rowspan`) and repeat the header every few dozen rows. This
//! module flattens the header grid into one name per column, so columns can
//! be found by keyword instead of position.

use scraper::{ElementRef, Html, Selector};

use super::ProviderError;

/// A parsed table: flattened column names plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlTable {
    /// One name per column, multi-level headers joined with `_`
    pub headers: Vec<String>,
    /// Data cells, trimmed
    pub rows: Vec<Vec<String>>,
}

/// A header cell that spans into following rows.
struct Spanning {
    col: usize,
    rows_left: usize,
    text: String,
}

impl HtmlTable {
    /// Find the first element matching `css` in `html` and parse it.
    ///
    /// Returns `Ok(None)` when no element matches.
    pub fn find(html: &str, css: &str) -> Result<Option<Self>, ProviderError> {
        let selector = Selector::parse(css)
            .map_err(|e| ProviderError::Parse(format!("invalid selector {}: {:?}", css, e)))?;
        let document = Html::parse_document(html);

        Ok(document.select(&selector).next().map(Self::from_element))
    }

    /// Parse a `<table>` element.
    pub fn from_element(table: ElementRef<'_>) -> Self {
        let mut header_rows: Vec<Vec<String>> = Vec::new();
        let mut spanning: Vec<Spanning> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();

        for row in table_rows(table) {
            let cells = row_cells(row);
            if cells.is_empty() {
                continue;
            }

            if is_header_row(row, &cells) {
                // Repeated headers inside the body are dropped
                if rows.is_empty() {
                    header_rows.push(layout_header_row(&cells, &mut spanning));
                }
                continue;
            }

            let values: Vec<String> = cells
                .iter()
                .flat_map(|cell| {
                    let span = attr_usize(*cell, "colspan");
                    std::iter::once(cell_text(*cell))
                        .chain(std::iter::repeat(String::new()).take(span - 1))
                })
                .collect();

            // Some pages repeat the header using <td> cells
            let repeats_header = header_rows
                .iter()
                .any(|h| h.first().map(|s| compact(s)) == values.first().map(|s| compact(s)));
            if repeats_header || values.iter().all(|v| v.is_empty()) {
                continue;
            }

            rows.push(values);
        }

        Self {
            headers: flatten_headers(&header_rows),
            rows,
        }
    }

    /// Index of the first column whose name contains every `all` keyword and
    /// none of the `none` keywords.
    pub fn find_column(&self, all: &[&str], none: &[&str]) -> Option<usize> {
        self.headers.iter().position(|h| {
            all.iter().all(|k| h.contains(k)) && !none.iter().any(|k| h.contains(k))
        })
    }

    /// Cell text at `(row, col)`, empty when absent.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse a numeric cell.
///
/// Strips thousands separators, trend arrows, `+` signs and `%`. Returns
/// `None` for placeholders such as `-` or empty cells.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '↗' | '↘' | '→' | '+' | '%') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '-') {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    // `tr` under the table, its thead/tbody/tfoot, but not nested tables
    table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
        .filter(|tr| {
            tr.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "table")
                .map_or(false, |owner| owner.id() == table.id())
        })
        .collect()
}

fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "th" | "td"))
        .collect()
}

fn is_header_row(row: ElementRef<'_>, cells: &[ElementRef<'_>]) -> bool {
    let in_thead = row
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "thead");

    in_thead || cells.iter().all(|c| c.value().name() == "th")
}

fn layout_header_row(cells: &[ElementRef<'_>], spanning: &mut Vec<Spanning>) -> Vec<String> {
    let mut row: Vec<Option<String>> = Vec::new();

    for span in spanning.iter_mut() {
        place(&mut row, span.col, span.text.clone());
        span.rows_left -= 1;
    }
    spanning.retain(|s| s.rows_left > 0);

    let mut col = 0;
    for cell in cells {
        while row.get(col).map_or(false, Option::is_some) {
            col += 1;
        }

        let text = compact(&cell_text(*cell));
        let colspan = attr_usize(*cell, "colspan");
        let rowspan = attr_usize(*cell, "rowspan");

        for c in col..col + colspan {
            place(&mut row, c, text.clone());
            if rowspan > 1 {
                spanning.push(Spanning {
                    col: c,
                    rows_left: rowspan - 1,
                    text: text.clone(),
                });
            }
        }
        col += colspan;
    }

    row.into_iter().map(Option::unwrap_or_default).collect()
}

fn place(row: &mut Vec<Option<String>>, col: usize, text: String) {
    if row.len() <= col {
        row.resize(col + 1, None);
    }
    row[col] = Some(text);
}

fn flatten_headers(header_rows: &[Vec<String>]) -> Vec<String> {
    let width = header_rows.iter().map(Vec::len).max().unwrap_or(0);

    (0..width)
        .map(|col| {
            let mut parts: Vec<&str> = Vec::new();
            for row in header_rows {
                if let Some(part) = row.get(col).filter(|p| !p.is_empty()) {
                    if !parts.contains(&part.as_str()) {
                        parts.push(part);
                    }
                }
            }
            parts.join("_")
        })
        .collect()
}

fn attr_usize(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_HEADER: &str = r#"
        <html><body>
        <table id="tblDetail">
          <tr><th rowspan="2">交易<br>日期</th><th rowspan="2">收盤</th><th colspan="2">法人買賣超(張)</th></tr>
          <tr><th>外資</th><th>投信</th></tr>
          <tr><td>'24/05/17</td><td>1,234.5</td><td>+1,000</td><td>-20</td></tr>
          <tr><th rowspan="2">交易<br>日期</th><th rowspan="2">收盤</th><th colspan="2">法人買賣超(張)</th></tr>
          <tr><th>外資</th><th>投信</th></tr>
          <tr><td>'24/05/16</td><td>1,200</td><td>-</td><td>5</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_flattens_multi_row_headers() {
        let table = HtmlTable::find(NESTED_HEADER, "#tblDetail").unwrap().unwrap();
        assert_eq!(
            table.headers,
            vec!["交易日期", "收盤", "法人買賣超(張)_外資", "法人買賣超(張)_投信"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 0), "'24/05/17");
        assert_eq!(table.cell(1, 2), "-");
    }

    #[test]
    fn test_find_column() {
        let table = HtmlTable::find(NESTED_HEADER, "#tblDetail").unwrap().unwrap();
        assert_eq!(table.find_column(&["外資"], &[]), Some(2));
        assert_eq!(table.find_column(&["法人"], &["外資"]), Some(3));
        assert_eq!(table.find_column(&["自營"], &[]), None);
    }

    #[test]
    fn test_missing_table() {
        assert!(HtmlTable::find("<html></html>", "#tblDetail").unwrap().is_none());
    }

    #[test]
    fn test_thead_with_td_and_repeated_td_header() {
        let html = r#"
            <table id="t">
              <thead><tr><td>代號</td><td>名稱</td></tr></thead>
              <tbody>
                <tr><td>2330</td><td>台積電</td></tr>
                <tr><td>代號</td><td>名稱</td></tr>
                <tr><td>0050</td><td>元大台灣50</td></tr>
              </tbody>
            </table>
        "#;
        let table = HtmlTable::find(html, "#t").unwrap().unwrap();
        assert_eq!(table.headers, vec!["代號", "名稱"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(1, 1), "元大台灣50");
        assert_eq!(table.cell(5, 5), "");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("+12"), Some(12.0));
        assert_eq!(parse_number("-3.2"), Some(-3.2));
        assert_eq!(parse_number("↗15.3"), Some(15.3));
        assert_eq!(parse_number("4.5%"), Some(4.5));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("N/A"), None);
    }
}
