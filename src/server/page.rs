//! Server-side rendering of the single page.

use crate::report::{REPORT_FILE_NAME, escape_html};
use crate::session::{Session, SessionState};
use std::{fmt::Write, time::Instant};

const STYLE: &str = include_str!("../../assets/style.css");

const HEADER: &str = r#"<div class="pulse">
    <h1>🌿 Advanced Crop Doctor Pro</h1>
    <p>AI-Powered Plant Health Diagnosis System</p>
</div>"#;

const CONTROLS: &str = r#"<div class="controls">
    <form action="/upload" method="post" enctype="multipart/form-data">
        <input type="file" name="file" accept=".jpg,.jpeg,.png,image/jpeg,image/png" required>
        <button type="submit">📤 Upload</button>
    </form>
    <form action="/analyze" method="post">
        <button type="submit">🚀 Launch Analysis</button>
    </form>
</div>"#;

const SIDEBAR: &str = r#"<aside class="sidebar">
    <h3>📸 Imaging Guide</h3>
    <ul>
        <li>🎯 <strong>Focus</strong>: Clear shots of affected areas</li>
        <li>🌞 <strong>Lighting</strong>: Natural light preferred</li>
        <li>📐 <strong>Angles</strong>: Multiple perspectives</li>
        <li>🖼️ <strong>Background</strong>: Simple, contrasting</li>
    </ul>
    <h3>⚠️ Common Issues</h3>
    <ul>
        <li>🍄 Fungal infections</li>
        <li>🦠 Bacterial diseases</li>
        <li>🐛 Pest infestations</li>
        <li>🌱 Nutrient deficiencies</li>
    </ul>
</aside>"#;

const FOOTER: &str = r#"<footer>
    <hr>
    <p>🌱 Powered by multimodal AI • Plant Pathology Analysis System v3.0</p>
</footer>"#;

pub fn render(session: &Session, now: Instant) -> String {
    let mut body = String::new();
    body.push_str(HEADER);
    body.push_str(CONTROLS);

    for notice in session.notices() {
        let _ = write!(
            body,
            r#"<div class="notice {}">{}</div>"#,
            notice.level(),
            escape_html(notice.message())
        );
    }

    if let Some(upload) = session.upload() {
        let _ = write!(
            body,
            r#"<hr><h3>📸 Submitted Plant Sample</h3><img class="sample" src="/image" alt="{}">"#,
            escape_html(&upload.file_name)
        );
    }

    if session.state() == SessionState::Analyzing {
        let percent = session.progress(now).unwrap_or(0);
        let _ = write!(
            body,
            r#"<p>🧪 Analyzing with AI...</p><div class="progress"><div class="progress-bar" style="width:{percent}%"></div></div>"#
        );
    }

    if let Some(report) = session.report() {
        body.push_str("<hr><h3>🔬 Comprehensive Diagnosis Report</h3>");
        body.push_str(r#"<div class="section-header"><h4>🌟 Health Rating</h4></div>"#);
        body.push_str(&report.rating().to_html());
        body.push_str(&report.to_html());
        body.push_str(
            r#"<img class="sample" src="/image" alt="Reference Image"><p class="caption">Reference Image</p>"#,
        );
        let _ = write!(
            body,
            r#"<a class="button" href="/report.txt" download="{REPORT_FILE_NAME}">📥 Download Full Report</a>"#
        );
    }

    body.push_str(FOOTER);

    // The page reloads itself until the analysis settles.
    let refresh = if session.state() == SessionState::Analyzing {
        r#"<meta http-equiv="refresh" content="1">"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{refresh}
<title>Crop Doctor</title>
<style>{STYLE}</style>
</head>
<body>
<div class="layout">
{SIDEBAR}
<main>
{body}
</main>
</div>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionInput;
    use std::{io::Cursor, time::Duration};

    fn png() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        ::image::RgbImage::new(2, 2)
            .write_to(&mut buffer, ::image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn idle_page_has_controls_and_no_report() {
        let page = render(&Session::new(Duration::from_secs(2)), Instant::now());
        assert!(page.contains("Launch Analysis"));
        assert!(page.contains("Imaging Guide"));
        assert!(!page.contains(r#"class="diagnosis-box""#));
        assert!(!page.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn analyzing_page_refreshes_with_progress() {
        let mut session = Session::new(Duration::from_secs(2));
        session.handle(SessionInput::ImageSelected {
            file_name: "leaf.png".to_string(),
            bytes: png(),
        });
        let start = Instant::now();
        session.handle(SessionInput::TriggerPressed { now: start });

        let page = render(&session, start + Duration::from_secs(1));
        assert!(page.contains("http-equiv=\"refresh\""));
        assert!(page.contains("width:50%"));
        assert!(page.contains("Submitted Plant Sample"));
    }

    #[test]
    fn done_page_shows_report_and_download() {
        let mut session = Session::new(Duration::from_secs(2));
        session.handle(SessionInput::ImageSelected {
            file_name: "leaf.png".to_string(),
            bytes: png(),
        });
        session.handle(SessionInput::TriggerPressed { now: Instant::now() });
        session.track(1);
        session.handle(SessionInput::DiagnosisReady {
            id: 1,
            text: "Health Rating: 5\nHealthy".to_string(),
        });

        let page = render(&session, Instant::now());
        assert!(page.contains("Health Rating: 5<br>Healthy"));
        assert!(page.contains("★★★☆☆"));
        assert!(page.contains(r#"href="/report.txt" download="plant_diagnosis_report.txt""#));
        assert!(page.contains("Reference Image"));
    }
}
