use itertools::Itertools;

/// Sort the lines lexicographically and drop adjacent duplicates, so that every distinct line
/// appears once.  Blank lines are not special here.

pub fn sort_and_dedup<'a, I>(lines: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    lines.into_iter().sorted().dedup().collect()
}

#[test]
fn test_sort_and_dedup() {
    let lines = vec!["b", "a", "c", "a", "", "b", ""];
    assert!(sort_and_dedup(lines) == vec!["", "a", "b", "c"]);
    assert!(sort_and_dedup(Vec::<&str>::new()).is_empty());
}

#[test]
fn test_sort_and_dedup_idempotent() {
    let once = sort_and_dedup("3|x\n1|y\n2|z\n1|y\n".split('\n'));
    let twice = sort_and_dedup(once.clone());
    assert!(once == twice);
    assert!(once == vec!["", "1|y", "2|z", "3|x"]);
}
