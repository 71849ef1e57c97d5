//! List-query compilation: request descriptor → validated execution plan.
//!
//! Sorting goes through the closed [`SortColumn`] enum and its static
//! comparators; caller text is only ever matched against that allow-list,
//! never forwarded to the data source.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::model::BoardGame;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A list request as the caller sent it. Absent fields take the defaults
/// `Name`, `ASC`, page `0`, size `10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub filter_text: Option<String>,
    pub sort_column: String,
    pub sort_order: String,
    pub page_index: i64,
    pub page_size: i64,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            filter_text: None,
            sort_column: SortColumn::Name.as_str().to_owned(),
            sort_order: SortOrder::Asc.as_str().to_owned(),
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Entity fields a list may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortColumn {
    Id,
    Name,
    Year,
    LastModifiedDate,
}

impl SortColumn {
    pub const ALL: [SortColumn; 4] = [Self::Id, Self::Name, Self::Year, Self::LastModifiedDate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "Name",
            Self::Year => "Year",
            Self::LastModifiedDate => "LastModifiedDate",
        }
    }

    fn comparator(self) -> fn(&BoardGame, &BoardGame) -> Ordering {
        match self {
            Self::Id => |a: &BoardGame, b: &BoardGame| a.id.cmp(&b.id),
            Self::Name => |a: &BoardGame, b: &BoardGame| {
                a.name.to_lowercase().cmp(&b.name.to_lowercase())
            },
            Self::Year => |a: &BoardGame, b: &BoardGame| a.year.cmp(&b.year),
            Self::LastModifiedDate => |a: &BoardGame, b: &BoardGame| {
                a.last_modified_date.cmp(&b.last_modified_date)
            },
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortColumn {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|column| column.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let allowed: Vec<_> = Self::ALL.iter().map(|c| c.as_str()).collect();
                ValidationErrors::single(
                    "sortColumn",
                    format!("Value must be one of the following: {}.", allowed.join(", ")),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            o if o.eq_ignore_ascii_case("ASC") => Ok(Self::Asc),
            o if o.eq_ignore_ascii_case("DESC") => Ok(Self::Desc),
            _ => Err(ValidationErrors::single(
                "sortOrder",
                "Value must be one of the following: ASC, DESC.",
            )),
        }
    }
}

/// A validated, normalized list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    needle: Option<String>,
    column: SortColumn,
    order: SortOrder,
    page_index: usize,
    page_size: usize,
}

/// One page of matches plus the match count before paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<BoardGame>,
    pub record_count: usize,
}

impl QueryPlan {
    /// Lowercased filter text; `None` matches everything.
    pub fn needle(&self) -> Option<&str> {
        self.needle.as_deref()
    }

    pub fn column(&self) -> SortColumn {
        self.column
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> usize {
        self.page_size
    }

    /// Case-insensitive substring match on `name`.
    pub fn matches(&self, game: &BoardGame) -> bool {
        match &self.needle {
            Some(needle) => game.name.to_lowercase().contains(needle.as_str()),
            None => true,
        }
    }

    /// Orders by the plan's column and direction, breaking ties by `id`.
    pub fn compare(&self, a: &BoardGame, b: &BoardGame) -> Ordering {
        let primary = (self.column.comparator())(a, b);
        let primary = match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// Runs the plan over an in-memory collection.
    pub fn execute<'a>(&self, games: impl IntoIterator<Item = &'a BoardGame>) -> Page {
        let mut matched: Vec<&BoardGame> = games.into_iter().filter(|g| self.matches(g)).collect();
        let record_count = matched.len();
        matched.sort_by(|a, b| self.compare(a, b));

        let items = matched
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .cloned()
            .collect();

        Page {
            items,
            record_count,
        }
    }
}

/// Validates list requests against the column allow-list and page bounds.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    default_page_size: i64,
    max_page_size: i64,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

impl QueryCompiler {
    pub fn new(default_page_size: i64, max_page_size: i64) -> Self {
        Self {
            default_page_size,
            max_page_size,
        }
    }

    pub fn max_page_size(&self) -> i64 {
        self.max_page_size
    }

    /// A request with every field at its default, using this compiler's
    /// default page size.
    pub fn default_request(&self) -> ListRequest {
        ListRequest {
            page_size: self.default_page_size,
            ..ListRequest::default()
        }
    }

    /// Compiles `request` into a plan, reporting every invalid field at once.
    pub fn compile(&self, request: &ListRequest) -> Result<QueryPlan, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let column = request
            .sort_column
            .parse::<SortColumn>()
            .map_err(|e| errors.extend(e))
            .ok();
        let order = request
            .sort_order
            .parse::<SortOrder>()
            .map_err(|e| errors.extend(e))
            .ok();

        if request.page_index < 0 {
            errors.add("pageIndex", "The field PageIndex must be 0 or greater.");
        }
        if request.page_size < 1 || request.page_size > self.max_page_size {
            errors.add(
                "pageSize",
                format!(
                    "The field PageSize must be between 1 and {}.",
                    self.max_page_size
                ),
            );
        }

        let (Some(column), Some(order)) = (column, order) else {
            return Err(errors);
        };
        errors.into_result()?;

        let needle = request
            .filter_text
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase);

        Ok(QueryPlan {
            needle,
            column,
            order,
            page_index: usize::try_from(request.page_index).unwrap_or_default(),
            page_size: usize::try_from(request.page_size).unwrap_or_default(),
        })
    }
}
