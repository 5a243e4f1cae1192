use promptml_core::notice::{
    EqOddsNotice, ErrorNotice, MissingNotice, ModelReportNotice, OutlierNotice,
    ProtectedNotice, ProxyNotice,
};
use serde_json::Value;
use std::fmt::Write;

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => escape_html(text),
        Value::Null => "null".to_string(),
        other => escape_html(&other.to_string()),
    }
}

/// Sidebar entry: title plus the expand and close affordances.
pub fn condensed_note(title: &str) -> String {
    format!(
        "<div class=\"note condensed\"><div class=\"essential\">\
         <div class=\"dropDown\"></div>\
         <div class=\"text\"><h1>{}</h1></div>\
         <div class=\"close\"></div>\
         </div></div>",
        escape_html(title)
    )
}

fn detail_shell(class: &str, heading: &str, body: &str) -> String {
    format!(
        "<div class=\"promptMl {class}\"><h1>{}</h1>{body}</div>",
        escape_html(heading)
    )
}

/// Groups items by a name field, keeping first-seen order.
fn group_by<'a, T>(
    items: &'a [T],
    name_of: impl Fn(&'a T) -> &'a str,
) -> Vec<(&'a str, Vec<&'a T>)> {
    let mut groups: Vec<(&'a str, Vec<&'a T>)> = Vec::new();
    for item in items {
        let name = name_of(item);
        match groups.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, members)) => members.push(item),
            None => groups.push((name, vec![item])),
        }
    }
    groups
}

pub fn proxy_detail(proxies: &[ProxyNotice]) -> String {
    let mut body = String::from(
        "<ul><li>Certain variables in this notebook may encode or strongly correlate with \
         sensitive variables. Using them may produce biased outcomes.</li>\
         <li>Correlations listed here may or may not be meaningful, and situation-specific \
         correlations may go undetected.</li></ul>",
    );
    for (df, members) in group_by(proxies, |p| p.df.as_str()) {
        let _ = write!(body, "<h3>Within <strong>{}</strong></h3><ul>", escape_html(df));
        for proxy in members {
            let relation = if proxy.is_strong() {
                "is strongly correlated with"
            } else {
                "may be predictive of"
            };
            let _ = write!(
                body,
                "<li>Column <strong>{}</strong> {relation} <strong>{}</strong>.</li>",
                escape_html(&proxy.proxy_col_name),
                escape_html(&proxy.sensitive_col_name)
            );
        }
        body.push_str("</ul>");
    }
    detail_shell("proxyColumn", "Proxy Columns Note", &body)
}

pub fn missing_detail(notices: &[MissingNotice]) -> String {
    let mut body = String::from(
        "<ul><li>Data may be missing because of biased collection practices or random error.</li>\
         <li>This plugin cannot tell whether the data are missing at random.</li></ul>",
    );
    for notice in notices {
        let _ = write!(
            body,
            "<h3>Within <strong>{}</strong></h3><ul>",
            escape_html(&notice.df)
        );
        for column in &notice.columns {
            let _ = write!(
                body,
                "<li>Column <strong>{}</strong> is missing <strong>{}</strong>/<strong>{}</strong> entries</li>",
                escape_html(&column.name),
                column.number_missing,
                column.total_length
            );
            if let (Some(correlated), Some(percent)) =
                (column.correlated_column.as_ref(), column.largest_percent)
            {
                let value = column
                    .largest_missing_value
                    .as_ref()
                    .map(scalar_text)
                    .unwrap_or_else(|| "unknown".to_string());
                let _ = write!(
                    body,
                    "<ul><li>This occurs most frequently ({percent}%) when {} is {value}</li></ul>",
                    escape_html(correlated)
                );
            }
        }
        body.push_str("</ul>");
    }
    detail_shell("missing", "Missing Data Note", &body)
}

pub fn errors_detail(notices: &[ErrorNotice]) -> String {
    let mut body = String::from("<ul class=\"model_list\">");
    for (model, members) in group_by(notices, |n| n.model_name.as_str()) {
        let _ = write!(
            body,
            "<li><strong>{}</strong> makes mistakes most frequently in:</li><ul>",
            escape_html(model)
        );
        for notice in members {
            let slice = notice
                .slice
                .iter()
                .map(|(column, value)| format!("{}: {}", escape_html(column), scalar_text(value)))
                .collect::<Vec<_>>()
                .join(", ");
            match notice.count {
                Some(count) => {
                    let _ = write!(body, "<li>{slice} ({count} rows)</li>");
                }
                None => {
                    let _ = write!(body, "<li>{slice}</li>");
                }
            }
        }
        body.push_str("</ul>");
    }
    body.push_str("</ul>");
    detail_shell("errors", "Errors Note", &body)
}

pub fn protected_detail(notices: &[ProtectedNotice]) -> String {
    let mut dfs = Vec::new();
    for notice in notices {
        if !dfs.contains(&notice.df.as_str()) {
            dfs.push(notice.df.as_str());
        }
    }
    let joined = dfs
        .iter()
        .map(|df| escape_html(df))
        .collect::<Vec<_>>()
        .join(", ");
    let mut body = format!(
        "<div class=\"intro\"><p>Some of the columns in the <strong>{joined}</strong> dataframe \
         feature protected classes of data. Using them may replicate harmful power structures \
         in model predictions.</p></div>"
    );
    for (df, members) in group_by(notices, |n| n.df.as_str()) {
        let _ = write!(
            body,
            "<div class=\"dfs\"><h2>Within <span class=\"code-snippet\">{}</span></h2><ul>",
            escape_html(df)
        );
        for column in members.into_iter().flat_map(ProtectedNotice::sensitive_columns) {
            let name = escape_html(&column.name);
            match column.field.as_ref() {
                Some(field) => {
                    let _ = write!(
                        body,
                        "<li>Column <b>{name}</b> resembles {}</li>",
                        scalar_text(field)
                    );
                }
                None => {
                    let _ = write!(body, "<li>Column <b>{name}</b> may be protected</li>");
                }
            }
        }
        body.push_str("</ul></div>");
    }
    detail_shell("protectedColumns", "Protected Column Note", &body)
}

pub fn model_report_detail(models: &[ModelReportNotice]) -> String {
    let mut body = String::from("<div class=\"models\">");
    for model in models {
        let _ = write!(
            body,
            "<div class=\"model\"><h2>Within <span class=\"code-snippet\">{}</span></h2>",
            escape_html(&model.model_name)
        );
        if let Some(accuracy) = model.accuracy {
            let _ = write!(body, "<p>Training accuracy: {accuracy:.3}</p>");
        }
        if !model.columns.is_empty() {
            body.push_str("<table><tr><th></th><th></th>");
            match model.values.as_ref() {
                Some(labels) => {
                    let (pos, neg) = (scalar_text(&labels.pos), scalar_text(&labels.neg));
                    let _ = write!(
                        body,
                        "<th>Pr[Predicted={pos}|Actual={neg}]</th><th>Pr[Predicted={neg}|Actual={pos}]</th>"
                    );
                }
                None => body.push_str("<th>FPR</th><th>FNR</th>"),
            }
            body.push_str("</tr>");
            for (column, values) in &model.columns {
                for (index, (value, rates)) in values.iter().enumerate() {
                    body.push_str("<tr>");
                    if index == 0 {
                        let _ = write!(
                            body,
                            "<th rowspan=\"{}\">{}</th>",
                            values.len(),
                            escape_html(column)
                        );
                    }
                    let _ = write!(
                        body,
                        "<td>{}</td><td>{:.3}</td><td>{:.3}</td></tr>",
                        escape_html(value),
                        rates.fpr,
                        rates.fnr
                    );
                }
            }
            body.push_str("</table>");
        }
        body.push_str("</div>");
    }
    body.push_str("</div>");
    detail_shell("uncertaintyNote", "Model Report", &body)
}

pub fn welcome_detail() -> String {
    detail_shell(
        "welcome",
        "Welcome to PromptML",
        "<p>Throughout this data task the plugin provides information about the data and your \
         decisions with respect to fairness, through distinct notifications.</p>\
         <h3>The Plugin Interface</h3>\
         <p>The side panel lists available notifications; the main area shows their content. \
         Notification content changes as cells are executed.</p>\
         <h3>Protected Data</h3>\
         <p>A protected class is a group of people sharing a common trait who are legally \
         protected from discrimination on the basis of that trait.</p>",
    )
}

pub fn outliers_detail(notices: &[OutlierNotice]) -> String {
    let mut body = String::from("<ul>");
    for notice in notices {
        let location = match notice.df_name.as_deref() {
            Some(df) => format!(" in data frame <b>{}</b>", escape_html(df)),
            None => String::new(),
        };
        let _ = write!(
            body,
            "<li>The column <b>{}</b>{location} contains values greater than {}, which is \
             {:.3} standard deviations above the column average.</li>",
            escape_html(&notice.col_name),
            notice.value,
            notice.std_dev
        );
    }
    body.push_str("</ul>");
    detail_shell("outliers", "Outliers Note", &body)
}

pub fn eq_odds_detail(notices: &[EqOddsNotice]) -> String {
    let mut body = String::new();
    for notice in notices {
        let correction = match notice.eq.as_deref() {
            Some("fpr") => "false positive rate equalization",
            Some("fnr") => "false negative rate equalization",
            _ => "equalized odds post-processing",
        };
        let _ = write!(
            body,
            "<p>Applying a {correction} to {} achieved a training accuracy of {:.3} \
             (original: {:.3}).</p><p>This correction changed {} predictions.</p>",
            escape_html(&notice.model_name),
            notice.acc_corr,
            notice.acc_orig,
            notice.num_changed
        );
        if let Some(group) = notice.grp.as_deref() {
            let _ = write!(
                body,
                "<p>The majority group in {} was treated as the privileged group.</p>",
                escape_html(group)
            );
        }
    }
    detail_shell("equalizedOdds", "Equalized Odds Note", &body)
}
