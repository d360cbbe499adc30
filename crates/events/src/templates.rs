//! HTML email bodies.

use expressr_core::job::{Job, OutputItem};
use expressr_core::status::JobStatus;
use expressr_core::styles;
use expressr_core::types::JobId;

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub html: String,
}

pub fn view_url(app_url: &str, job_id: JobId) -> String {
    format!("{}/view/{job_id}", app_url.trim_end_matches('/'))
}

fn button(href: &str, text: &str) -> String {
    format!(
        "<p><a href=\"{href}\" style=\"background: #3B82F6; color: white; padding: 12px 24px; \
         text-decoration: none; border-radius: 6px; display: inline-block;\">{text}</a></p>"
    )
}

fn item_list(items: &[OutputItem]) -> String {
    let entries: String = items
        .iter()
        .map(|item| {
            let emoji = styles::find(&item.style_id).map(|s| s.emoji).unwrap_or("");
            format!("<li>{emoji} {}</li>", item.label)
        })
        .collect();
    format!("<ul>{entries}</ul>")
}

fn wrap(body: &str) -> String {
    format!("<div style=\"font-family: sans-serif; max-width: 600px; margin: 0 auto;\">{body}</div>")
}

/// Free pack finished.
pub fn free_pack_ready(app_url: &str, job_id: JobId, items: &[OutputItem], price: &str) -> Email {
    let body = format!(
        "<h1>Your expressions are ready!</h1>\
         <p>We trained AI on your face and generated {} professional expressions:</p>\
         {}{}\
         <p style=\"color: #666; font-size: 14px; margin-top: 40px;\">\
         Want all 12 expressions including Shocked 😱 and Excited 🤩?<br/>\
         Unlock the full pack for just {price} on the view page.</p>",
        items.len(),
        item_list(items),
        button(&view_url(app_url, job_id), "View Your Expressions →"),
    );
    Email {
        subject: format!("Your {} Free Expressions Are Ready! 🎉", items.len()),
        html: wrap(&body),
    }
}

/// Payment confirmed; full generation is starting.
pub fn payment_received(app_url: &str, job_id: JobId) -> Email {
    let body = format!(
        "<h1>Payment received, thank you!</h1>\
         <p>We are now generating the rest of your expression pack. \
         You will get another email as soon as it is ready.</p>{}",
        button(&view_url(app_url, job_id), "Check Progress →"),
    );
    Email {
        subject: "Payment confirmed: generating your full pack".to_string(),
        html: wrap(&body),
    }
}

/// Full pack finished.
pub fn full_pack_ready(app_url: &str, job_id: JobId, items: &[OutputItem]) -> Email {
    let body = format!(
        "<h1>Your full expression pack is ready!</h1>\
         <p>All {} expressions are waiting for you:</p>{}{}",
        items.len(),
        item_list(items),
        button(&view_url(app_url, job_id), "Download Your Pack →"),
    );
    Email {
        subject: "Your Full Expression Pack Is Ready! 🚀".to_string(),
        html: wrap(&body),
    }
}

/// Training failed on the provider side.
pub fn training_failed(app_url: &str) -> Email {
    let body = format!(
        "<h1>We could not process your photos</h1>\
         <p>Model training failed on our provider's side. Please try again with a new \
         set of clear, well-lit photos showing only your face.</p>{}",
        button(&format!("{}/create", app_url.trim_end_matches('/')), "Try Again →"),
    );
    Email {
        subject: "We hit a problem with your photos".to_string(),
        html: wrap(&body),
    }
}

/// Order history for recovery, newest first.
pub fn order_history(app_url: &str, jobs: &[Job]) -> Email {
    let links: String = jobs
        .iter()
        .map(|job| {
            let marker = if job.status == JobStatus::Complete {
                "✅ Ready"
            } else {
                "⏳ Processing"
            };
            format!(
                "<li><a href=\"{}\">Order from {} ({marker})</a></li>",
                view_url(app_url, job.id),
                job.created_at.format("%Y-%m-%d"),
            )
        })
        .collect();
    Email {
        subject: "Wait, I found your photos! 📸".to_string(),
        html: format!(
            "<h1>Your Order History</h1>\
             <p>Here are the links to your expression packs:</p>\
             <ul>{links}</ul>\
             <p>Click any link above to view and download your photos.</p>"
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use expressr_core::job::Tier;

    use super::*;

    fn item(style_id: &str, label: &str) -> OutputItem {
        OutputItem {
            style_id: style_id.into(),
            label: label.into(),
            url: format!("https://cdn.test/{style_id}.jpg"),
            tier: Tier::Free,
            regeneration_count: 0,
        }
    }

    fn job(status: JobStatus) -> Job {
        let created = Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 0).unwrap();
        Job {
            id: uuid::Uuid::now_v7(),
            submitter: "a@b.test".into(),
            status,
            photo_count: 10,
            training_ref: None,
            model_ref: None,
            is_paid: false,
            payment_session_ref: None,
            items: Vec::new(),
            error_detail: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn view_url_has_no_double_slash() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            view_url("https://app.test/", id),
            "https://app.test/view/00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn free_pack_lists_items_with_emoji() {
        let id = uuid::Uuid::now_v7();
        let email = free_pack_ready(
            "https://app.test",
            id,
            &[item("happy", "Happy"), item("sad", "Sad")],
            "$9.99",
        );
        assert_eq!(email.subject, "Your 2 Free Expressions Are Ready! 🎉");
        assert!(email.html.contains("<li>😊 Happy</li>"));
        assert!(email.html.contains(&format!("https://app.test/view/{id}")));
        assert!(email.html.contains("$9.99"));
    }

    #[test]
    fn order_history_marks_ready_and_processing() {
        let email = order_history(
            "https://app.test",
            &[job(JobStatus::Complete), job(JobStatus::Training)],
        );
        assert!(email.html.contains("Order from 2026-02-14 (✅ Ready)"));
        assert!(email.html.contains("(⏳ Processing)"));
    }
}
