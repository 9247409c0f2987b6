//! Keeps a tab's layout and its widgets consistent.
//!
//! The pure functions work on an in-memory [`Tab`]; `replace_layout` and
//! `remove_widget` load and store the tab through a repository and are meant to run
//! on a transactional view.

use std::collections::HashMap;

use crate::error::{AppError, Result, ResultExt};
use crate::models::{Layout, Tab, Widget};

use super::Repository;

/// Rearranges the tab's widgets following `layout`.
///
/// `layout` must be exactly a permutation of the widget ids currently in the tab:
/// no unknown id, no duplicate, no widget left out. On error the tab is untouched.
pub fn reorder(tab: &mut Tab, layout: &Layout) -> Result<()> {
    let mut remaining: HashMap<i64, &Widget> = tab.widgets().map(|w| (w.id, w)).collect();

    let mut columns = Vec::with_capacity(layout.len());
    for column in layout {
        let mut widgets = Vec::with_capacity(column.len());
        for widget_id in column {
            let widget = remaining.remove(widget_id).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "widget {widget_id} is not part of tab {}",
                    tab.id()
                ))
            })?;
            widgets.push(widget.clone());
        }
        columns.push(widgets);
    }

    if !remaining.is_empty() {
        let mut missing: Vec<i64> = remaining.into_keys().collect();
        missing.sort_unstable();
        return Err(AppError::InvalidInput(format!(
            "new layout of tab {} leaves out widgets {missing:?}",
            tab.id()
        )));
    }

    tab.widgets = columns;
    Ok(())
}

/// Takes the widget out of its column, keeping the order of the others.
pub fn remove(tab: &mut Tab, widget_id: i64) -> Result<Widget> {
    let position = tab.widgets.iter().enumerate().find_map(|(col, column)| {
        column
            .iter()
            .position(|w| w.id == widget_id)
            .map(|row| (col, row))
    });

    match position {
        Some((col, row)) => Ok(tab.widgets[col].remove(row)),
        None => Err(AppError::NotFound(format!(
            "widget {widget_id} in tab {}",
            tab.id()
        ))),
    }
}

/// Puts the widget at the end of the first column, creating the column if needed.
pub fn append(tab: &mut Tab, widget: Widget) {
    if tab.widgets.is_empty() {
        tab.widgets.push(Vec::new());
    }
    tab.widgets[0].push(widget);
}

pub async fn replace_layout(repo: &dyn Repository, tab_id: i64, layout: &Layout) -> Result<()> {
    let mut tab = repo
        .get_tab(tab_id)
        .await
        .context("retrieving tab from datastore failed")?;

    reorder(&mut tab, layout)?;

    repo.store_tab(&mut tab)
        .await
        .context("saving tab in datastore failed")
}

pub async fn remove_widget(repo: &dyn Repository, tab_id: i64, widget_id: i64) -> Result<()> {
    let mut tab = repo
        .get_tab(tab_id)
        .await
        .context("retrieving tab from datastore failed")?;

    remove(&mut tab, widget_id)?;

    repo.store_tab(&mut tab)
        .await
        .context("saving tab in datastore failed")
}
