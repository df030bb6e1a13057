//! Cell roles derived from fill colour.
//!
//! Exercise authors mark cells by painting them. The palette below is the
//! documented set; any other fill (or none) means the cell is not graded.
//!
//! | Role               | Fill     |
//! |--------------------|----------|
//! | Input              | `FFFF99` |
//! | Calculation        | `CCFFCC` |
//! | CalculationHelper  | `FFCC99` |
//! | Selection          | `99CCFF` |
//! | FormatCheck        | `CC99FF` |
//!
//! Matching compares red, green and blue only; alpha is ignored.

use serde::Deserialize;

use calcgrade_engine::{Cell, CellAddr, Rgba, Workbook};

pub const INPUT: Rgba = Rgba::from_u32(0xFFFF99);
pub const CALCULATION: Rgba = Rgba::from_u32(0xCCFFCC);
pub const CALCULATION_HELPER: Rgba = Rgba::from_u32(0xFFCC99);
pub const SELECTION: Rgba = Rgba::from_u32(0x99CCFF);
pub const FORMAT_CHECK: Rgba = Rgba::from_u32(0xCC99FF);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellRole {
    Input,
    Calculation,
    CalculationHelper,
    Selection,
    FormatCheck,
    None,
}

impl CellRole {
    /// Roles whose cells go through the formatting/protection check.
    pub fn participates_in_formatting(self) -> bool {
        matches!(self, Self::FormatCheck | Self::Calculation | Self::Input | Self::Selection)
    }
}

impl std::fmt::Display for CellRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Calculation => write!(f, "calculation"),
            Self::CalculationHelper => write!(f, "calculation_helper"),
            Self::Selection => write!(f, "selection"),
            Self::FormatCheck => write!(f, "format_check"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Colour → role table. Overridable from the `[palette]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Palette {
    pub input: Rgba,
    pub calculation: Rgba,
    pub calculation_helper: Rgba,
    pub selection: Rgba,
    pub format_check: Rgba,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            input: INPUT,
            calculation: CALCULATION,
            calculation_helper: CALCULATION_HELPER,
            selection: SELECTION,
            format_check: FORMAT_CHECK,
        }
    }
}

impl Palette {
    pub fn role(&self, fill: Option<Rgba>) -> CellRole {
        let Some(fill) = fill else {
            return CellRole::None;
        };
        let rgb = fill.to_u32();
        [
            (self.input, CellRole::Input),
            (self.calculation, CellRole::Calculation),
            (self.calculation_helper, CellRole::CalculationHelper),
            (self.selection, CellRole::Selection),
            (self.format_check, CellRole::FormatCheck),
        ]
        .into_iter()
        .find(|(colour, _)| colour.to_u32() == rgb)
        .map_or(CellRole::None, |(_, role)| role)
    }

    pub fn role_of(&self, cell: &Cell) -> CellRole {
        self.role(cell.style.fill)
    }

    /// Two palette entries with the same colour would make roles ambiguous.
    pub fn validate(&self) -> Result<(), String> {
        let colours = [
            ("input", self.input),
            ("calculation", self.calculation),
            ("calculation_helper", self.calculation_helper),
            ("selection", self.selection),
            ("format_check", self.format_check),
        ];
        for (i, (name, colour)) in colours.iter().enumerate() {
            if let Some((other, _)) = colours[i + 1..].iter().find(|(_, c)| c.to_u32() == colour.to_u32()) {
                return Err(format!("palette entries '{name}' and '{other}' share colour {}", colour.to_hex()));
            }
        }
        Ok(())
    }
}

/// Every cell with a role other than None, in sheet/row/column order.
pub fn classify(workbook: &Workbook, palette: &Palette) -> Vec<(CellAddr, CellRole)> {
    let mut out = Vec::new();
    for (s, sheet) in workbook.sheets().iter().enumerate() {
        for ((row, col), cell) in sheet.cells_iter() {
            let role = palette.role_of(cell);
            if role != CellRole::None {
                out.push((CellAddr::new(s, *row, *col), role));
            }
        }
    }
    out
}

/// Cells of one role, in sheet/row/column order.
pub fn cells_with_role(workbook: &Workbook, palette: &Palette, role: CellRole) -> Vec<CellAddr> {
    classify(workbook, palette)
        .into_iter()
        .filter(|(_, r)| *r == role)
        .map(|(addr, _)| addr)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_palette() {
        let p = Palette::default();
        assert_eq!(p.role(Some(Rgba::rgb(0xFF, 0xFF, 0x99))), CellRole::Input);
        assert_eq!(p.role(Some(Rgba::rgb(0xCC, 0xFF, 0xCC))), CellRole::Calculation);
        assert_eq!(p.role(Some(Rgba::rgb(0xFF, 0xCC, 0x99))), CellRole::CalculationHelper);
        assert_eq!(p.role(Some(Rgba::rgb(0x99, 0xCC, 0xFF))), CellRole::Selection);
        assert_eq!(p.role(Some(Rgba::rgb(0xCC, 0x99, 0xFF))), CellRole::FormatCheck);
        assert_eq!(p.role(Some(Rgba::rgb(0, 0, 0))), CellRole::None);
        assert_eq!(p.role(None), CellRole::None);
    }

    #[test]
    fn test_alpha_ignored() {
        let translucent = Rgba { a: 0x40, ..CALCULATION };
        assert_eq!(Palette::default().role(Some(translucent)), CellRole::Calculation);
    }

    #[test]
    fn test_participation() {
        assert!(CellRole::Input.participates_in_formatting());
        assert!(CellRole::FormatCheck.participates_in_formatting());
        assert!(!CellRole::CalculationHelper.participates_in_formatting());
        assert!(!CellRole::None.participates_in_formatting());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut p = Palette::default();
        assert!(p.validate().is_ok());
        p.selection = p.input;
        let err = p.validate().unwrap_err();
        assert!(err.contains("input") && err.contains("selection"));
    }

    #[test]
    fn test_classify_scan_order() {
        let mut wb = Workbook::new();
        wb.add_sheet("A");
        wb.add_sheet("B");
        let paint = |wb: &mut Workbook, s: usize, r: usize, c: usize, fill: Rgba| {
            let sheet = wb.sheet_mut(s).unwrap();
            let mut style = calcgrade_engine::CellStyle::default();
            style.fill = Some(fill);
            sheet.set_style(r, c, style);
        };
        paint(&mut wb, 1, 0, 0, INPUT);
        paint(&mut wb, 0, 2, 0, CALCULATION);
        paint(&mut wb, 0, 0, 3, SELECTION);
        paint(&mut wb, 0, 1, 1, Rgba::rgb(1, 2, 3));

        let roles = classify(&wb, &Palette::default());
        assert_eq!(
            roles,
            vec![
                (CellAddr::new(0, 0, 3), CellRole::Selection),
                (CellAddr::new(0, 2, 0), CellRole::Calculation),
                (CellAddr::new(1, 0, 0), CellRole::Input),
            ]
        );
        assert_eq!(cells_with_role(&wb, &Palette::default(), CellRole::Input), vec![CellAddr::new(1, 0, 0)]);
    }
}
