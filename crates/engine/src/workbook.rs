use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::cell_id::{col_to_letters, CellAddr, RangeRef};
use crate::formula::eval::{evaluate, CellLookup, Value};
use crate::formula::refs::references;
use crate::sheet::Sheet;

/// Error stored for a formula whose source does not parse.
pub const PARSE_ERROR: &str = "#ERROR!";
/// Error stored for a formula that (indirectly) reads itself.
pub const CIRCULAR_ERROR: &str = "#CIRC!";

/// Document-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentProperties {
    pub title: String,
    pub subject: String,
    /// Free-form keywords field; carries the instruction code of a handed-out exercise.
    pub keywords: String,
}

/// Summary of a recalculation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcReport {
    pub cells_recomputed: usize,
    /// Formula cells whose result is an error value.
    pub error_cells: usize,
    pub had_cycles: bool,
}

/// A workbook containing multiple sheets
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    pub properties: DocumentProperties,
}

impl Workbook {
    /// Create an empty workbook (no sheets).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sheets(sheets: Vec<Sheet>, properties: DocumentProperties) -> Self {
        Self { sheets, properties }
    }

    /// Append a sheet and return its index.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> usize {
        self.sheets.push(Sheet::new(name));
        self.sheets.len() - 1
    }

    pub fn push_sheet(&mut self, sheet: Sheet) -> usize {
        self.sheets.push(sheet);
        self.sheets.len() - 1
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    /// Sheet names compare case-insensitively.
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.sheets.iter().position(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheet_index(name).and_then(|i| self.sheets.get(i))
    }

    pub fn cell(&self, addr: CellAddr) -> Option<&Cell> {
        self.sheets.get(addr.sheet)?.cell(addr.row, addr.col)
    }

    pub fn cell_mut(&mut self, addr: CellAddr) -> Option<&mut Cell> {
        self.sheets.get_mut(addr.sheet)?.cell_mut(addr.row, addr.col)
    }

    /// Set a cell from user-style input ("42", "text", "=A1*2"). Style is kept.
    pub fn set_cell_input(&mut self, addr: CellAddr, input: &str) -> Result<(), String> {
        let sheet = self.sheets.get_mut(addr.sheet).ok_or_else(|| format!("Sheet not found: {}", addr))?;
        sheet.set_value(addr.row, addr.col, input);
        Ok(())
    }

    /// Replace a cell's formula text. Style is kept, the cached result dropped.
    pub fn set_formula(&mut self, addr: CellAddr, source: &str) -> Result<(), String> {
        let sheet = self.sheets.get_mut(addr.sheet).ok_or_else(|| format!("Sheet not found: {}", addr))?;
        sheet.set_formula(addr.row, addr.col, source);
        Ok(())
    }

    /// Human-readable address: `Sheet!B3`.
    pub fn describe(&self, addr: CellAddr) -> String {
        match self.sheets.get(addr.sheet) {
            Some(sheet) => format!("{}!{}{}", sheet.name, col_to_letters(addr.col), addr.row + 1),
            None => addr.to_string(),
        }
    }

    /// Every formula cell, in sheet/row/column order.
    pub fn formula_cells(&self) -> Vec<CellAddr> {
        self.sheets
            .iter()
            .enumerate()
            .flat_map(|(s, sheet)| {
                sheet
                    .cells_iter()
                    .filter(|(_, cell)| cell.is_formula())
                    .map(move |((r, c), _)| CellAddr::new(s, *r, *c))
            })
            .collect()
    }

    /// Evaluate a cell against the current contents, ignoring cached results.
    pub fn evaluate(&self, addr: CellAddr) -> Value {
        Evaluation::new(self).value_of(addr)
    }

    /// Recompute every formula cell and store the results.
    pub fn recalculate(&mut self) -> RecalcReport {
        let targets = self.formula_cells();
        self.recalculate_cells(&targets)
    }

    /// Recompute the given formula cells and store their results.
    /// Non-formula addresses are skipped.
    pub fn recalculate_cells(&mut self, targets: &[CellAddr]) -> RecalcReport {
        let mut report = RecalcReport::default();
        let results: Vec<(CellAddr, Value)> = {
            let evaluation = Evaluation::new(self);
            let results = targets
                .iter()
                .filter(|addr| self.cell(**addr).is_some_and(Cell::is_formula))
                .map(|addr| (*addr, evaluation.value_of(*addr)))
                .collect();
            report.had_cycles = evaluation.saw_cycle.get();
            results
        };

        for (addr, value) in results {
            if value.is_error() {
                report.error_cells += 1;
            }
            if let Some(cell) = self.cell_mut(addr) {
                cell.cached = Some(value);
                report.cells_recomputed += 1;
            }
        }
        if report.had_cycles {
            log::debug!("recalculation hit a circular reference ({} error cells)", report.error_cells);
        }
        report
    }

    /// Formula cells that read `addr`, directly or through other formulas.
    /// Sorted in sheet/row/column order, `addr` itself excluded.
    pub fn dependents(&self, addr: CellAddr) -> Vec<CellAddr> {
        let formulas: Vec<(CellAddr, Vec<(usize, RangeRef)>)> = self
            .formula_cells()
            .into_iter()
            .map(|f| (f, self.resolved_references(f)))
            .collect();

        let mut found: BTreeSet<CellAddr> = BTreeSet::new();
        let mut queue = VecDeque::from([addr]);
        while let Some(target) = queue.pop_front() {
            for (formula, refs) in &formulas {
                if found.contains(formula) || *formula == addr {
                    continue;
                }
                let reads = refs
                    .iter()
                    .any(|(sheet, r)| *sheet == target.sheet && r.contains(target.row, target.col));
                if reads {
                    found.insert(*formula);
                    queue.push_back(*formula);
                }
            }
        }
        found.into_iter().collect()
    }

    /// References of a formula cell with sheet qualifiers resolved to indices.
    /// References to unknown sheets are dropped.
    fn resolved_references(&self, addr: CellAddr) -> Vec<(usize, RangeRef)> {
        let Some(ast) = self.cell(addr).and_then(|c| c.value.formula_ast()) else {
            return Vec::new();
        };
        references(ast)
            .into_iter()
            .filter_map(|r| {
                let sheet = match r.sheet.as_deref() {
                    None => addr.sheet,
                    Some(name) => self.sheet_index(name)?,
                };
                Some((sheet, r))
            })
            .collect()
    }
}

// ============================================================================
// Evaluation - memoized, precedents-first evaluation over one workbook snapshot
// ============================================================================

struct Evaluation<'a> {
    workbook: &'a Workbook,
    memo: RefCell<FxHashMap<CellAddr, Value>>,
    /// Formula cells whose precedents are still being settled.
    on_path: RefCell<FxHashSet<CellAddr>>,
    saw_cycle: std::cell::Cell<bool>,
}

impl<'a> Evaluation<'a> {
    fn new(workbook: &'a Workbook) -> Self {
        Self {
            workbook,
            memo: RefCell::new(FxHashMap::default()),
            on_path: RefCell::new(FxHashSet::default()),
            saw_cycle: std::cell::Cell::new(false),
        }
    }

    fn value_of(&self, addr: CellAddr) -> Value {
        let Some(cell) = self.workbook.cell(addr) else {
            return if addr.sheet < self.workbook.sheet_count() {
                Value::Empty
            } else {
                Value::error(crate::formula::eval::REF)
            };
        };
        if !cell.is_formula() {
            return cell.current_value();
        }
        if let Some(v) = self.memo.borrow().get(&addr) {
            return v.clone();
        }
        if self.on_path.borrow().contains(&addr) {
            self.saw_cycle.set(true);
            return Value::error(CIRCULAR_ERROR);
        }

        self.settle(addr);
        self.memo
            .borrow()
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| Value::error(CIRCULAR_ERROR))
    }

    /// Evaluate `root` after every formula it reads, depth-first with an
    /// explicit stack so long chains cannot overflow the call stack.
    /// A precedent still on the path is a cycle and reads as `#CIRC!`.
    fn settle(&self, root: CellAddr) {
        struct Frame {
            cell: CellAddr,
            precedents: Vec<CellAddr>,
            next_idx: usize,
        }

        self.on_path.borrow_mut().insert(root);
        let mut stack = vec![Frame { cell: root, precedents: self.formula_precedents(root), next_idx: 0 }];

        while let Some(frame) = stack.last_mut() {
            if frame.next_idx < frame.precedents.len() {
                let p = frame.precedents[frame.next_idx];
                frame.next_idx += 1;
                if self.memo.borrow().contains_key(&p) || self.on_path.borrow().contains(&p) {
                    continue;
                }
                self.on_path.borrow_mut().insert(p);
                stack.push(Frame { cell: p, precedents: self.formula_precedents(p), next_idx: 0 });
            } else {
                let Some(finished) = stack.pop() else { break };
                let value = self.compute(finished.cell);
                self.on_path.borrow_mut().remove(&finished.cell);
                self.memo.borrow_mut().insert(finished.cell, value);
            }
        }
    }

    /// Run one formula. Its acyclic precedents are already memoized.
    fn compute(&self, addr: CellAddr) -> Value {
        let Some(cell) = self.workbook.cell(addr) else {
            return Value::Empty;
        };
        match cell.value.formula_ast() {
            Some(ast) => {
                let lookup = SheetLookup { evaluation: self, sheet: addr.sheet };
                match evaluate(ast, &lookup) {
                    // A formula pointing at an empty cell shows 0
                    Value::Empty => Value::Number(0.0),
                    v => v,
                }
            }
            None => Value::error(PARSE_ERROR),
        }
    }

    /// Formula cells inside any reference of the formula at `addr`.
    fn formula_precedents(&self, addr: CellAddr) -> Vec<CellAddr> {
        let mut out = Vec::new();
        for (idx, range) in self.workbook.resolved_references(addr) {
            let Some(sheet) = self.workbook.sheet(idx) else {
                continue;
            };
            // Walk whichever is smaller: the range or the stored cells
            if range.cell_count().is_some_and(|n| n <= sheet.cell_count()) {
                out.extend(
                    range
                        .cells()
                        .filter(|(r, c)| sheet.cell(*r, *c).is_some_and(Cell::is_formula))
                        .map(|(r, c)| CellAddr::new(idx, r, c)),
                );
            } else {
                out.extend(
                    sheet
                        .cells_iter()
                        .filter(|((r, c), cell)| cell.is_formula() && range.contains(*r, *c))
                        .map(|((r, c), _)| CellAddr::new(idx, *r, *c)),
                );
            }
        }
        out
    }
}

/// CellLookup for formulas living on one sheet.
struct SheetLookup<'e, 'a> {
    evaluation: &'e Evaluation<'a>,
    sheet: usize,
}

impl CellLookup for SheetLookup<'_, '_> {
    fn get(&self, sheet: Option<&str>, row: usize, col: usize) -> Value {
        let sheet = match sheet {
            None => self.sheet,
            Some(name) => match self.evaluation.workbook.sheet_index(name) {
                Some(idx) => idx,
                None => return Value::error(crate::formula::eval::REF),
            },
        };
        self.evaluation.value_of(CellAddr::new(sheet, row, col))
    }
}
