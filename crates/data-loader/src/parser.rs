//! Parsers for the storage export files.
//!
//! All files are `::`-separated with one record per line:
//! - movies.dat: movieId::title::genres[::votes::vote_average]
//! - ratings.dat: userId::movieId::score::timestamp
//! - similarities.dat: movieId::otherMovieId::score
//! - features.dat: movieId::c1,c2,...,cn

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::{FromStr, Split};

/// Read a file as ISO-8859-1 (Latin-1) lines.
///
/// Every byte maps directly to a Unicode code point, so this never fails on
/// non-UTF-8 titles.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DataLoadError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataLoadError::IoError(e),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let content: String = bytes.iter().map(|&b| b as char).collect();

    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Pull the next `::` field or fail with the field name in the error
fn next_field<'a>(
    parts: &mut Split<'a, &'static str>,
    file: &str,
    line: usize,
    name: &str,
) -> Result<&'a str> {
    parts.next().ok_or_else(|| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Missing {}", name),
    })
}

/// Parse a field into a number, keeping the line context on failure
fn parse_number<T>(value: &str, file: &str, line: usize, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Invalid {}: {}", name, e),
    })
}

/// Parse an optional trailing numeric field; empty means absent
fn parse_optional<T>(value: Option<&str>, file: &str, line: usize, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_number(v, file, line, name).map(Some),
    }
}

/// Parse the movies.dat file
///
/// The title often includes year in parentheses: "Toy Story (1995)"
/// Genres are pipe-separated: "Animation|Children's|Comedy"
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    const FILE: &str = "movies.dat";
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split("::");
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let title = next_field(&mut parts, FILE, line_no, "title")?;
        let genres_str = next_field(&mut parts, FILE, line_no, "genres")?;
        let votes = parse_optional(parts.next(), FILE, line_no, "votes")?;
        let vote_average = parse_optional(parts.next(), FILE, line_no, "vote_average")?;

        movies.push(Movie {
            id: parse_number(movie_id, FILE, line_no, "movieId")?,
            title: title.to_string(),
            year: extract_year_from_title(title),
            genres: parse_genres(genres_str)?,
            votes,
            vote_average,
        });
    }
    Ok(movies)
}

/// Parse the ratings.dat file
///
/// Scores outside the ten valid levels are rejected.
pub fn parse_ratings(path: &Path) -> Result<Vec<Rating>> {
    const FILE: &str = "ratings.dat";
    let lines = read_lines_latin1(path)?;
    let mut ratings = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split("::");
        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let score = next_field(&mut parts, FILE, line_no, "score")?;
        let timestamp = next_field(&mut parts, FILE, line_no, "timestamp")?;

        let score: f32 = parse_number(score, FILE, line_no, "score")?;
        if !is_valid_score(score) {
            return Err(DataLoadError::InvalidValue {
                field: "score".to_string(),
                value: score.to_string(),
            });
        }

        ratings.push(Rating {
            user_id: parse_number(user_id, FILE, line_no, "userId")?,
            movie_id: parse_number(movie_id, FILE, line_no, "movieId")?,
            score,
            timestamp: parse_number(timestamp, FILE, line_no, "timestamp")?,
        });
    }
    Ok(ratings)
}

/// Parse the similarities.dat file
pub fn parse_similarities(path: &Path) -> Result<Vec<SimilarityEdge>> {
    const FILE: &str = "similarities.dat";
    let lines = read_lines_latin1(path)?;
    let mut edges = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split("::");
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let other_movie_id = next_field(&mut parts, FILE, line_no, "otherMovieId")?;
        let score = next_field(&mut parts, FILE, line_no, "score")?;

        edges.push(SimilarityEdge {
            movie_id: parse_number(movie_id, FILE, line_no, "movieId")?,
            other_movie_id: parse_number(other_movie_id, FILE, line_no, "otherMovieId")?,
            score: parse_number(score, FILE, line_no, "score")?,
        });
    }
    Ok(edges)
}

/// Parse the features.dat file into (movie id, component vector) rows.
///
/// Every row must have the same number of components.
pub fn parse_features(path: &Path) -> Result<Vec<(MovieId, Vec<f32>)>> {
    const FILE: &str = "features.dat";
    let lines = read_lines_latin1(path)?;
    let mut rows: Vec<(MovieId, Vec<f32>)> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split("::");
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let components = next_field(&mut parts, FILE, line_no, "components")?;

        let values = components
            .split(',')
            .map(|c| parse_number::<f32>(c, FILE, line_no, "component"))
            .collect::<Result<Vec<f32>>>()?;

        if let Some((_, first)) = rows.first() {
            if first.len() != values.len() {
                return Err(DataLoadError::ValidationError(format!(
                    "line {} has {} components, expected {}",
                    line_no,
                    values.len(),
                    first.len()
                )));
            }
        }

        rows.push((parse_number(movie_id, FILE, line_no, "movieId")?, values));
    }
    Ok(rows)
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        let year_str = &title[start + 1..end];
        if let Ok(year) = year_str.parse::<u16>() {
            return Some(year);
        }
    }
    None
}

/// Parse a genre name into the Genre enum.
///
/// Accepts both the MovieLens spellings and the TMDB ones.
fn parse_genre(s: &str) -> Result<Genre> {
    match s.trim() {
        "Action" => Ok(Genre::Action),
        "Adventure" => Ok(Genre::Adventure),
        "Animation" => Ok(Genre::Animation),
        "Children's" | "Children" => Ok(Genre::Children),
        "Comedy" => Ok(Genre::Comedy),
        "Crime" => Ok(Genre::Crime),
        "Documentary" => Ok(Genre::Documentary),
        "Drama" => Ok(Genre::Drama),
        "Family" => Ok(Genre::Family),
        "Fantasy" => Ok(Genre::Fantasy),
        "Film-Noir" => Ok(Genre::FilmNoir),
        "History" => Ok(Genre::History),
        "Horror" => Ok(Genre::Horror),
        "Music" => Ok(Genre::Music),
        "Musical" => Ok(Genre::Musical),
        "Mystery" => Ok(Genre::Mystery),
        "Romance" => Ok(Genre::Romance),
        "Sci-Fi" | "Science Fiction" => Ok(Genre::SciFi),
        "Thriller" => Ok(Genre::Thriller),
        "TV Movie" => Ok(Genre::TvMovie),
        "War" => Ok(Genre::War),
        "Western" => Ok(Genre::Western),
        _ => Err(DataLoadError::InvalidValue {
            field: "genre".to_string(),
            value: s.to_string(),
        }),
    }
}

/// Parse pipe-separated genres. An empty field or "(no genres listed)"
/// yields no genres.
fn parse_genres(s: &str) -> Result<Vec<Genre>> {
    let s = s.trim();
    if s.is_empty() || s == "(no genres listed)" {
        return Ok(Vec::new());
    }
    let mut genres = Vec::new();
    for genre_str in s.split('|') {
        let genre = parse_genre(genre_str)?;
        if !genres.contains(&genre) {
            genres.push(genre);
        }
    }
    Ok(genres)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("data-loader-parser-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year_from_title("Toy Story (1995)"), Some(1995));
        assert_eq!(extract_year_from_title("Movie Title"), None);
        assert_eq!(extract_year_from_title("Broken (Title"), None);
    }

    #[test]
    fn test_parse_genre() {
        assert_eq!(parse_genre("Action").unwrap(), Genre::Action);
        assert_eq!(parse_genre("Science Fiction").unwrap(), Genre::SciFi);
        assert!(parse_genre("Space Opera").is_err());
    }

    #[test]
    fn test_parse_genres_deduplicates_and_allows_empty() {
        let genres = parse_genres("Action|Sci-Fi|Science Fiction").unwrap();
        assert_eq!(genres, vec![Genre::Action, Genre::SciFi]);
        assert!(parse_genres("").unwrap().is_empty());
        assert!(parse_genres("(no genres listed)").unwrap().is_empty());
    }

    #[test]
    fn test_parse_movies_with_optional_vote_fields() {
        let path = write_temp(
            "movies.dat",
            "1::Toy Story (1995)::Animation|Children's|Comedy::450000::8.3\n\n2::Untitled::Drama\n",
        );
        let movies = parse_movies(&path).unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].year, Some(1995));
        assert_eq!(movies[0].votes, Some(450000));
        assert_eq!(movies[0].vote_average, Some(8.3));
        assert_eq!(movies[1].year, None);
        assert_eq!(movies[1].votes, None);
        assert_eq!(movies[1].genres, vec![Genre::Drama]);
    }

    #[test]
    fn test_parse_ratings_rejects_invalid_levels() {
        let ok = write_temp("ratings_ok.dat", "1::10::4.5::978300760\n1::11::0.5::978300761\n");
        let ratings = parse_ratings(&ok).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].score, 4.5);

        let bad = write_temp("ratings_bad.dat", "1::10::4.3::978300760\n");
        assert!(matches!(
            parse_ratings(&bad),
            Err(DataLoadError::InvalidValue { .. })
        ));

        let missing = write_temp("ratings_missing.dat", "1::10\n");
        assert!(matches!(
            parse_ratings(&missing),
            Err(DataLoadError::ParseError { line: 1, .. })
        ));
    }

    #[test]
    fn test_parse_features_requires_uniform_width() {
        let ok = write_temp("features_ok.dat", "3::0.1,0.2,0.3\n7::1.0,0.0,-0.5\n");
        let rows = parse_features(&ok).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, 7);
        assert_eq!(rows[1].1, vec![1.0, 0.0, -0.5]);

        let ragged = write_temp("features_bad.dat", "3::0.1,0.2,0.3\n7::1.0,0.0\n");
        assert!(matches!(
            parse_features(&ragged),
            Err(DataLoadError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = parse_similarities(Path::new("/definitely/not/here/similarities.dat"));
        assert!(matches!(result, Err(DataLoadError::FileNotFound { .. })));
    }
}
