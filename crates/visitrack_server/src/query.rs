//! Query evaluation.
//!
//! Filters, sorts and paginates a record snapshot, and computes the stats
//! that travel with every page.

use std::cmp::Ordering;
use time::Duration;
use visitrack_engine::{DateRange, QueryScope};
use visitrack_protocol::{
    Pagination, QueryRequest, QueryResponse, QueryStats, SortDirection, SortSpec, SubjectKind,
    VisitRecord, VisitStatus,
};

/// Builds the scope a request filters on.
pub fn scope_of(request: &QueryRequest) -> QueryScope {
    QueryScope {
        date_range: request
            .date
            .map(|start| DateRange::new(start, start + Duration::DAY)),
        access_scope: request.access_scope.clone(),
    }
}

/// Returns true if the record matches every quick-filter term.
///
/// Terms match case-insensitively against the display name, the subject ID
/// and the record ID.
pub fn matches_filter(record: &VisitRecord, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = format!(
        "{} {} {}",
        record.display_name.to_lowercase(),
        record.subject_id.to_lowercase(),
        record.id.to_lowercase()
    );
    terms
        .iter()
        .all(|term| haystack.contains(&term.to_lowercase()))
}

/// Compares two records by a list of criteria, most significant first.
pub fn compare(a: &VisitRecord, b: &VisitRecord, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let ordering = a.compare_by(b, spec.field);
        let ordering = match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Tallies entries and exits per subject kind.
///
/// A record counts as an entry while `EntryGranted` and as an exit once it
/// has left (`ExitGranted` or `Finalized`).
pub fn compute_stats(records: &[&VisitRecord]) -> QueryStats {
    let mut stats = QueryStats {
        total_count: records.len() as u64,
        ..QueryStats::default()
    };
    for kind in SubjectKind::ALL {
        let of_kind = records.iter().filter(|r| r.subject_kind == kind);
        let (entries, exits) = of_kind.fold((0u64, 0u64), |(entries, exits), record| {
            match record.status {
                VisitStatus::EntryGranted => (entries + 1, exits),
                VisitStatus::ExitGranted | VisitStatus::Finalized => (entries, exits + 1),
                _ => (entries, exits),
            }
        });
        stats.set_tally(kind, entries, exits);
    }
    stats
}

/// Evaluates a query against a snapshot in registration order.
///
/// `page_size` is the size actually served; it may differ from the request.
pub fn run_query(snapshot: &[VisitRecord], request: &QueryRequest, page_size: u32) -> QueryResponse {
    let scope = scope_of(request);
    let mut matching: Vec<&VisitRecord> = snapshot
        .iter()
        .filter(|record| scope.includes(record) && matches_filter(record, &request.filter))
        .collect();

    let sort = if request.sort.is_empty() {
        vec![SortSpec::default()]
    } else {
        request.sort.clone()
    };
    matching.sort_by(|a, b| compare(a, b, &sort));

    let stats = compute_stats(&matching);
    let first_record = matching
        .iter()
        .max_by_key(|record| record.last_modified)
        .map(|record| (*record).clone());

    let pagination = Pagination::new(request.pagination.page, page_size);
    let rows = matching
        .iter()
        .skip(pagination.offset())
        .take(page_size as usize)
        .map(|record| (*record).clone())
        .collect();

    let mut response = QueryResponse::new(rows, matching.len() as u64, stats);
    response.first_record = first_record;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use visitrack_protocol::SortField;
    use visitrack_testkit::{at, records_strategy, sample_day, sort_spec_strategy, PropTestConfig};

    fn request(page: u32, size: u32) -> QueryRequest {
        QueryRequest::new(Pagination::new(page, size))
    }

    #[test]
    fn default_sort_is_most_recent_first() {
        let response = run_query(&sample_day(), &request(0, 2), 2);
        let ids: Vec<_> = response.paginated_results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["u-1", "v-dora"]);
        assert_eq!(response.total_count, 5);
        assert_eq!(response.first_record.map(|r| r.id), Some("u-1".to_string()));
    }

    #[test]
    fn quick_filter_matches_all_terms() {
        let req = request(0, 10).with_filter(vec!["ana".into(), "LOPEZ".into()]);
        let response = run_query(&sample_day(), &req, 10);
        assert_eq!(response.total_count, 1);
        assert_eq!(response.paginated_results[0].id, "v-ana");
    }

    #[test]
    fn access_scope_and_date_filter() {
        let req = request(0, 10).with_access_scope("lab");
        assert_eq!(run_query(&sample_day(), &req, 10).total_count, 1);

        let req = request(0, 10).with_date(at(0, 0));
        assert_eq!(run_query(&sample_day(), &req, 10).total_count, 5);

        let req = request(0, 10).with_date(at(0, 0) + Duration::DAY);
        assert_eq!(run_query(&sample_day(), &req, 10).total_count, 0);
    }

    #[test]
    fn stats_count_current_state() {
        let response = run_query(&sample_day(), &request(0, 10), 10);
        assert_eq!(response.stats.tally(SubjectKind::Visitor), (1, 1));
        assert_eq!(response.stats.tally(SubjectKind::Employee), (1, 0));
        assert_eq!(response.stats.tally(SubjectKind::Unknown), (0, 0));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let response = run_query(&sample_day(), &request(4, 2), 2);
        assert!(response.paginated_results.is_empty());
        assert_eq!(response.total_count, 5);
    }

    #[test]
    fn secondary_sort_breaks_ties() {
        let sort = vec![
            SortSpec::new(SortField::Status, SortDirection::Asc),
            SortSpec::new(SortField::DisplayName, SortDirection::Desc),
        ];
        let mut req = request(0, 10);
        req.sort = sort;
        let response = run_query(&sample_day(), &req, 10);
        let ids: Vec<_> = response.paginated_results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["u-1", "v-ana", "e-carla", "v-bruno", "v-dora"]);
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn pages_partition_the_result(
            records in records_strategy(12),
            sort in sort_spec_strategy(),
            page_size in 1u32..5,
        ) {
            let full = run_query(&records, &request(0, 100).with_sort(sort), 100);
            let mut stitched = Vec::new();
            for page in 0..Pagination::new(0, page_size).page_count(full.total_count) {
                let part = run_query(&records, &request(page, page_size).with_sort(sort), page_size);
                prop_assert!(part.paginated_results.len() <= page_size as usize);
                stitched.extend(part.paginated_results);
            }
            prop_assert_eq!(stitched, full.paginated_results);
        }
    }
}
