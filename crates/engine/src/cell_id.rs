//! Cell identity and A1 addressing.
//!
//! A `CellAddr` uniquely identifies a cell across all sheets in a workbook.
//! Its ordering (sheet, then row, then column) is the scan order every
//! document comparison uses.

use serde::{Deserialize, Serialize};

/// Rows per sheet; references past this row do not parse.
pub const MAX_ROWS: usize = 1_048_576;
/// Columns per sheet (column XFD).
pub const MAX_COLS: usize = 16_384;

/// Unique identifier for a cell in a workbook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddr {
    /// Sheet index (0-based, document order)
    pub sheet: usize,
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
}

impl CellAddr {
    #[inline]
    pub fn new(sheet: usize, row: usize, col: usize) -> Self {
        Self { sheet, row, col }
    }

    /// A1-style address without sheet qualifier ("B3").
    pub fn a1(&self) -> String {
        format!("{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl std::fmt::Display for CellAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}!{}", self.sheet + 1, self.a1())
    }
}

/// Convert 0-based column index to Excel-style letter(s).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert column letters to 0-based index (A=0, B=1, ..., Z=25, AA=26, ...)
pub fn col_from_letters(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col.checked_mul(26)?.checked_add(c.to_ascii_uppercase() as usize - 'A' as usize + 1)?;
    }
    Some(col - 1)
}

/// Parse a cell reference like "A1" or "$A$1" into (row, col).
/// Addresses outside the `MAX_ROWS` x `MAX_COLS` grid are rejected.
pub fn parse_a1(cell_ref: &str) -> Option<(usize, usize)> {
    let cell_ref = cell_ref.trim().replace('$', "");
    let split = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell_ref.split_at(split);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = col_from_letters(letters)?;
    let row: usize = digits.parse().ok()?;
    if row == 0 || row > MAX_ROWS || col >= MAX_COLS {
        return None;
    }
    Some((row - 1, col))
}

/// A rectangular reference, optionally qualified with a sheet name.
///
/// Produced by `parse_range_ref` from text such as `Lists!$A$2:$A$8`,
/// `'My Sheet'!B1` or `C2:C9`. Bounds are normalized (start <= end).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRef {
    pub sheet: Option<String>,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl RangeRef {
    pub fn new(sheet: Option<String>, start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            sheet,
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    /// Every (row, col) in the range, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.start_row..=self.end_row)
            .flat_map(move |r| (self.start_col..=self.end_col).map(move |c| (r, c)))
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.start_row..=self.end_row).contains(&row) && (self.start_col..=self.end_col).contains(&col)
    }

    /// None when the area does not fit in a `usize`.
    pub fn cell_count(&self) -> Option<usize> {
        (self.end_row - self.start_row + 1).checked_mul(self.end_col - self.start_col + 1)
    }
}

/// Parse a (possibly sheet-qualified) cell or range reference.
///
/// Accepts an optional leading `=`, quoted sheet names with doubled quotes
/// (`'Bob''s'!A1`), and absolute markers.
pub fn parse_range_ref(text: &str) -> Option<RangeRef> {
    let text = text.trim();
    let text = text.strip_prefix('=').unwrap_or(text).trim();

    let (sheet, body) = match text.rfind('!') {
        Some(bang) => {
            let raw = &text[..bang];
            let name = if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
                raw[1..raw.len() - 1].replace("''", "'")
            } else {
                raw.to_string()
            };
            if name.is_empty() {
                return None;
            }
            (Some(name), &text[bang + 1..])
        }
        None => (None, text),
    };

    match body.split_once(':') {
        Some((start, end)) => {
            let (sr, sc) = parse_a1(start)?;
            let (er, ec) = parse_a1(end)?;
            Some(RangeRef::new(sheet, sr, sc, er, ec))
        }
        None => {
            let (r, c) = parse_a1(body)?;
            Some(RangeRef::new(sheet, r, c, r, c))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_letters_roundtrip() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_from_letters("A"), Some(0));
        assert_eq!(col_from_letters("aa"), Some(26));
        assert_eq!(col_from_letters("ZZ"), Some(701));
        assert_eq!(col_from_letters(""), None);
        assert_eq!(col_from_letters("A1"), None);
    }

    #[test]
    fn test_parse_a1() {
        assert_eq!(parse_a1("A1"), Some((0, 0)));
        assert_eq!(parse_a1("$B$3"), Some((2, 1)));
        assert_eq!(parse_a1("c10"), Some((9, 2)));
        assert_eq!(parse_a1("A0"), None);
        assert_eq!(parse_a1("12"), None);
        assert_eq!(parse_a1("A1B"), None);
    }

    #[test]
    fn test_parse_a1_rejects_off_grid() {
        assert_eq!(parse_a1("XFD1048576"), Some((MAX_ROWS - 1, MAX_COLS - 1)));
        assert_eq!(parse_a1("XFE1"), None);
        assert_eq!(parse_a1("A1048577"), None);
        assert_eq!(parse_a1("A18446744073709551616"), None);
        assert_eq!(parse_a1("MWLQKWV1"), None);
    }

    #[test]
    fn test_huge_range_does_not_parse() {
        assert!(parse_range_ref("A1:MWLQKWV4294967296").is_none());
        assert!(parse_range_ref("Lists!A1:A99999999").is_none());

        let whole_sheet = parse_range_ref("A1:XFD1048576").unwrap();
        assert_eq!(whole_sheet.cell_count(), Some(MAX_ROWS * MAX_COLS));
        assert_eq!(RangeRef::new(None, 0, 0, usize::MAX - 1, 2).cell_count(), None);
    }

    #[test]
    fn test_cell_addr_ordering_is_scan_order() {
        let mut addrs = vec![
            CellAddr::new(1, 0, 0),
            CellAddr::new(0, 2, 0),
            CellAddr::new(0, 1, 5),
            CellAddr::new(0, 1, 2),
        ];
        addrs.sort();
        assert_eq!(
            addrs,
            vec![
                CellAddr::new(0, 1, 2),
                CellAddr::new(0, 1, 5),
                CellAddr::new(0, 2, 0),
                CellAddr::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_parse_range_ref_sheet_qualified() {
        let r = parse_range_ref("Lists!$A$2:$A$8").unwrap();
        assert_eq!(r.sheet.as_deref(), Some("Lists"));
        assert_eq!((r.start_row, r.start_col, r.end_row, r.end_col), (1, 0, 7, 0));
        assert_eq!(r.cell_count(), Some(7));
    }

    #[test]
    fn test_parse_range_ref_quoted_and_reversed() {
        let r = parse_range_ref("='Bob''s Sheet'!C5:A1").unwrap();
        assert_eq!(r.sheet.as_deref(), Some("Bob's Sheet"));
        assert_eq!((r.start_row, r.start_col, r.end_row, r.end_col), (0, 0, 4, 2));
    }

    #[test]
    fn test_parse_range_ref_single_cell() {
        let r = parse_range_ref("B2").unwrap();
        assert_eq!(r.sheet, None);
        assert_eq!(r.cells().collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn test_range_cells_row_major() {
        let r = RangeRef::new(None, 0, 0, 1, 1);
        assert_eq!(r.cells().collect::<Vec<_>>(), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_display() {
        assert_eq!(CellAddr::new(0, 2, 1).to_string(), "#1!B3");
        assert_eq!(CellAddr::new(0, 2, 1).a1(), "B3");
    }
}
