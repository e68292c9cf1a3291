//! Per-course attendance and grade aggregates.
use crate::errors::StoreError;
use crate::storage::{Attendance, Course, Enrollment, Grade, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReportFilter {
    pub course_id: Option<i64>,
    pub provider_id: Option<i64>,
}

impl ReportFilter {
    fn matches(&self, course: &Course) -> bool {
        self.course_id.map_or(true, |id| course.id == id)
            && self
                .provider_id
                .map_or(true, |id| course.provider_id == Some(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceReportRow {
    pub course_id: i64,
    pub course_code: String,
    pub course_name: String,
    pub provider_id: Option<i64>,
    pub enrolled: usize,
    /// Distinct session dates with at least one record
    pub sessions: usize,
    pub records: usize,
    pub present: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeReportRow {
    pub course_id: i64,
    pub course_code: String,
    pub course_name: String,
    pub provider_id: Option<i64>,
    pub enrolled: usize,
    pub graded: usize,
    pub average_score: Option<f64>,
    pub passed: usize,
    pub failed: usize,
}

pub fn summarize_attendance(
    course: &Course,
    enrollments: &[Enrollment],
    records: &[Attendance],
) -> AttendanceReportRow {
    let sessions: BTreeSet<_> = records.iter().map(|r| r.session_date).collect();
    let present = records.iter().filter(|r| r.present).count();
    let attendance_rate = if records.is_empty() {
        0.0
    } else {
        present as f64 / records.len() as f64
    };

    AttendanceReportRow {
        course_id: course.id,
        course_code: course.code.clone(),
        course_name: course.name.clone(),
        provider_id: course.provider_id,
        enrolled: enrollments.len(),
        sessions: sessions.len(),
        records: records.len(),
        present,
        attendance_rate,
    }
}

pub fn summarize_grades(
    course: &Course,
    enrollments: &[Enrollment],
    grades: &[Grade],
    pass_mark: f64,
) -> GradeReportRow {
    let average_score = (!grades.is_empty())
        .then(|| grades.iter().map(|g| g.score).sum::<f64>() / grades.len() as f64);
    let passed = grades.iter().filter(|g| g.score >= pass_mark).count();

    GradeReportRow {
        course_id: course.id,
        course_code: course.code.clone(),
        course_name: course.name.clone(),
        provider_id: course.provider_id,
        enrolled: enrollments.len(),
        graded: grades.len(),
        average_score,
        passed,
        failed: grades.len() - passed,
    }
}

async fn selected_courses(
    store: &dyn Store,
    filter: &ReportFilter,
) -> Result<Vec<Course>, StoreError> {
    Ok(store
        .list_courses()
        .await?
        .into_iter()
        .filter(|c| filter.matches(c))
        .collect())
}

pub async fn attendance_report(
    store: &dyn Store,
    filter: &ReportFilter,
) -> Result<Vec<AttendanceReportRow>, StoreError> {
    let mut rows = Vec::new();
    for course in selected_courses(store, filter).await? {
        let enrollments = store.list_enrollments(course.id).await?;
        let records = store.list_attendance(course.id).await?;
        rows.push(summarize_attendance(&course, &enrollments, &records));
    }
    Ok(rows)
}

pub async fn grade_report(
    store: &dyn Store,
    filter: &ReportFilter,
    pass_mark: f64,
) -> Result<Vec<GradeReportRow>, StoreError> {
    let mut rows = Vec::new();
    for course in selected_courses(store, filter).await? {
        let enrollments = store.list_enrollments(course.id).await?;
        let grades = store.list_grades(course.id).await?;
        rows.push(summarize_grades(&course, &enrollments, &grades, pass_mark));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, NewAttendance, NewEnrollment, NewGrade, NewParticipant};
    use chrono::NaiveDate;

    fn course() -> Course {
        Course {
            id: 1,
            code: "CUR-001".into(),
            name: "PRL".into(),
            provider_id: Some(7),
            instructor_id: None,
            created_at: 0,
        }
    }

    fn attendance(enrollment_id: i64, day: u32, present: bool) -> Attendance {
        Attendance {
            id: 0,
            enrollment_id,
            session_date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            present,
            recorded_by: "u".into(),
            recorded_at: 0,
        }
    }

    fn grade(enrollment_id: i64, score: f64) -> Grade {
        Grade {
            id: 0,
            enrollment_id,
            score,
            recorded_by: "u".into(),
            recorded_at: 0,
        }
    }

    #[test]
    fn test_attendance_rate() {
        let records = [
            attendance(1, 10, true),
            attendance(2, 10, false),
            attendance(1, 11, true),
            attendance(2, 11, true),
        ];
        let row = summarize_attendance(&course(), &[], &records);

        assert_eq!(row.sessions, 2);
        assert_eq!(row.records, 4);
        assert_eq!(row.present, 3);
        assert_eq!(row.attendance_rate, 0.75);
    }

    #[test]
    fn test_attendance_rate_is_zero_without_records() {
        let row = summarize_attendance(&course(), &[], &[]);
        assert_eq!(row.attendance_rate, 0.0);
        assert_eq!(row.sessions, 0);
    }

    #[test]
    fn test_grade_pass_fail_split() {
        let grades = [grade(1, 60.0), grade(2, 59.9), grade(3, 90.0)];
        let row = summarize_grades(&course(), &[], &grades, 60.0);

        assert_eq!(row.graded, 3);
        assert_eq!(row.passed, 2);
        assert_eq!(row.failed, 1);
        let avg = row.average_score.unwrap();
        assert!((avg - 69.966).abs() < 0.01);
    }

    #[test]
    fn test_ungraded_course_has_no_average() {
        let row = summarize_grades(&course(), &[], &[], 60.0);
        assert_eq!(row.average_score, None);
        assert_eq!(row.failed, 0);
    }

    #[tokio::test]
    async fn test_reports_respect_filters() {
        let store = MemoryStore::with_fixtures();
        let cur1 = store.find_course_by_code("CUR-001").await.unwrap().unwrap();
        let p = store
            .upsert_participant(NewParticipant {
                email: "a@x.com".into(),
                name: "Ana".into(),
                provider_id: None,
            })
            .await
            .unwrap();
        let e = store
            .upsert_enrollment(NewEnrollment {
                participant_id: p.id,
                course_id: cur1.id,
                role: None,
                import_job_id: None,
            })
            .await
            .unwrap();
        store
            .upsert_attendance(NewAttendance {
                enrollment_id: e.id,
                session_date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
                present: true,
                recorded_by: "u".into(),
            })
            .await
            .unwrap();
        store
            .upsert_grade(NewGrade {
                enrollment_id: e.id,
                score: 45.0,
                recorded_by: "u".into(),
            })
            .await
            .unwrap();

        let all = attendance_report(&store, &ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let by_provider = attendance_report(
            &store,
            &ReportFilter {
                course_id: None,
                provider_id: cur1.provider_id,
            },
        )
        .await
        .unwrap();
        assert_eq!(by_provider.len(), 2);

        let one = grade_report(
            &store,
            &ReportFilter {
                course_id: Some(cur1.id),
                provider_id: None,
            },
            60.0,
        )
        .await
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].enrolled, 1);
        assert_eq!(one[0].failed, 1);
    }
}
