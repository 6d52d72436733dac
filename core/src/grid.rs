use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{finite_number, CellCoord};

/// Rectangular numeric matrix of `height` rows by `width` columns.
///
/// Every row has the width of the first row and every cell is finite. Build
/// one from loosely shaped input with [`normalize_grid_matrix`].
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GridMatrix {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl GridMatrix {
    /// Creates a matrix without rows.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            cells: Vec::new(),
        }
    }

    /// Creates a `width × height` matrix filled with zeros.
    #[must_use]
    pub fn zeros(width: usize, height: usize) -> Self {
        if width == 0 || height == 0 {
            return Self::empty();
        }
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    /// Builds a matrix from rows, forcing every row to the width of row 0.
    ///
    /// Short rows are padded with zeros, long rows are truncated and
    /// non-finite cells become zero.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 {
            return Self::empty();
        }

        let height = rows.len();
        let mut cells = Vec::with_capacity(width * height);
        for mut row in rows {
            row.resize(width, 0.0);
            cells.extend(
                row.into_iter()
                    .map(|cell| if cell.is_finite() { cell } else { 0.0 }),
            );
        }

        Self {
            width,
            height,
            cells,
        }
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Whether the matrix holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Value at the provided column and row, if inside the matrix.
    #[must_use]
    pub fn get(&self, column: usize, row: usize) -> Option<f32> {
        if column >= self.width || row >= self.height {
            return None;
        }
        self.cells.get(row * self.width + column).copied()
    }

    /// Value stored for a cell coordinate, if inside the matrix.
    #[must_use]
    pub fn at(&self, cell: CellCoord) -> Option<f32> {
        let column = usize::try_from(cell.column()).ok()?;
        let row = usize::try_from(cell.row()).ok()?;
        self.get(column, row)
    }

    /// Iterates over the rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.cells.chunks(self.width.max(1))
    }

    /// Number of cells holding a strictly positive value.
    #[must_use]
    pub fn positive_count(&self) -> usize {
        self.cells.iter().filter(|cell| **cell > 0.0).count()
    }

    /// Cells holding a strictly positive value, in row-major order.
    pub fn positive_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0.0)
            .map(move |(index, _)| CellCoord::new((index % width) as i32, (index / width) as i32))
    }
}

impl Serialize for GridMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

impl<'de> Deserialize<'de> for GridMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(normalize_grid_matrix(&value))
    }
}

/// Normalises loosely shaped grid input into a canonical [`GridMatrix`].
///
/// Accepts arrays of rows or objects keyed by row index, where each row is
/// an array or an object keyed by column index. Cells may be numbers,
/// booleans (`true → 1`, `false → 0`) or numeric strings; anything else
/// becomes `0`. `null` and other scalars yield an empty matrix.
#[must_use]
pub fn normalize_grid_matrix(value: &Value) -> GridMatrix {
    let rows: Vec<Vec<f32>> = match value {
        Value::Array(rows) => rows.iter().map(normalize_row).collect(),
        Value::Object(rows) => ordered_values(rows).map(normalize_row).collect(),
        _ => return GridMatrix::empty(),
    };
    GridMatrix::from_rows(rows)
}

fn normalize_row(row: &Value) -> Vec<f32> {
    match row {
        Value::Array(cells) => cells.iter().map(normalize_cell).collect(),
        Value::Object(cells) => ordered_values(cells).map(normalize_cell).collect(),
        _ => Vec::new(),
    }
}

fn normalize_cell(cell: &Value) -> f32 {
    match cell {
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        other => finite_number(other).map_or(0.0, |number| number as f32),
    }
}

/// Values of an index-keyed object ordered by numeric key, then by text.
fn ordered_values(map: &Map<String, Value>) -> impl Iterator<Item = &Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(left, _), (right, _)| {
        match (left.parse::<u64>(), right.parse::<u64>()) {
            (Ok(left), Ok(right)) => left.cmp(&right),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => left.cmp(right),
        }
    });
    entries.into_iter().map(|(_, value)| value)
}
