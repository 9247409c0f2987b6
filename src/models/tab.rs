use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Column-major arrangement of widget ids inside a tab.
pub type Layout = Vec<Vec<i64>>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabSummary {
    pub id: i64,
    pub title: String,
}

/// A named collection of widget columns shown together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tab {
    #[serde(flatten)]
    pub summary: TabSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<Vec<Widget>>,
}

impl Tab {
    /// A tab that has not been stored yet, with `columns` empty columns.
    pub fn new(title: impl Into<String>, columns: usize) -> Self {
        Self {
            summary: TabSummary {
                id: 0,
                title: title.into(),
            },
            widgets: vec![Vec::new(); columns],
        }
    }

    pub fn id(&self) -> i64 {
        self.summary.id
    }

    pub fn layout(&self) -> Layout {
        self.widgets
            .iter()
            .map(|column| column.iter().map(|w| w.id).collect())
            .collect()
    }

    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.widgets.iter().flatten()
    }

    pub fn widget(&self, widget_id: i64) -> Option<&Widget> {
        self.widgets().find(|w| w.id == widget_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Feed,
    Email,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Feed => "feed",
            WidgetKind::Email => "email",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "feed" => Ok(WidgetKind::Feed),
            "email" => Ok(WidgetKind::Email),
            other => Err(AppError::InvalidInput(format!("unknown widget type: {other:?}"))),
        }
    }
}

/// Settings every widget has, whatever its kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WidgetSettings {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub display_count: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(flatten)]
    pub common: WidgetSettings,
    #[serde(default)]
    pub feed_id: i64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(flatten)]
    pub common: WidgetSettings,
    #[serde(default)]
    pub account_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetConfig {
    Feed(FeedConfig),
    Email(EmailConfig),
}

impl WidgetConfig {
    pub fn kind(&self) -> WidgetKind {
        match self {
            WidgetConfig::Feed(_) => WidgetKind::Feed,
            WidgetConfig::Email(_) => WidgetKind::Email,
        }
    }

    pub fn common(&self) -> &WidgetSettings {
        match self {
            WidgetConfig::Feed(cfg) => &cfg.common,
            WidgetConfig::Email(cfg) => &cfg.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut WidgetSettings {
        match self {
            WidgetConfig::Feed(cfg) => &mut cfg.common,
            WidgetConfig::Email(cfg) => &mut cfg.common,
        }
    }

    /// Parses a stored or received config blob into the variant named by `kind`.
    pub fn from_value(kind: WidgetKind, value: serde_json::Value) -> Result<Self> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        let config = match kind {
            WidgetKind::Feed => WidgetConfig::Feed(serde_json::from_value(value)?),
            WidgetKind::Email => WidgetConfig::Email(serde_json::from_value(value)?),
        };
        Ok(config)
    }

    pub fn from_json(kind: WidgetKind, json: &str) -> Result<Self> {
        Self::from_value(kind, serde_json::from_str(json)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            WidgetConfig::Feed(cfg) => serde_json::to_value(cfg)?,
            WidgetConfig::Email(cfg) => serde_json::to_value(cfg)?,
        };
        Ok(value)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }
}

/// A configured panel placed in a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWidget", into = "RawWidget")]
pub struct Widget {
    pub id: i64,
    pub config: WidgetConfig,
}

impl Widget {
    pub fn new(id: i64, config: WidgetConfig) -> Self {
        Self { id, config }
    }

    pub fn feed(id: i64, config: FeedConfig) -> Self {
        Self::new(id, WidgetConfig::Feed(config))
    }

    pub fn email(id: i64, config: EmailConfig) -> Self {
        Self::new(id, WidgetConfig::Email(config))
    }

    pub fn kind(&self) -> WidgetKind {
        self.config.kind()
    }
}

/// Wire form of a widget: a type tag next to an untyped config object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWidget {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "widgetType")]
    pub widget_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl TryFrom<RawWidget> for Widget {
    type Error = AppError;

    fn try_from(raw: RawWidget) -> Result<Self> {
        let kind: WidgetKind = raw.widget_type.parse()?;
        let config = WidgetConfig::from_value(kind, raw.config).map_err(|err| {
            AppError::InvalidInput(format!("invalid {kind} widget config: {err}"))
        })?;
        Ok(Widget::new(raw.id, config))
    }
}

impl From<Widget> for RawWidget {
    fn from(widget: Widget) -> Self {
        RawWidget {
            id: widget.id,
            widget_type: widget.kind().as_str().to_string(),
            config: widget.config.to_value().unwrap_or_default(),
        }
    }
}
