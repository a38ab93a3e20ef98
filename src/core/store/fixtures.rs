use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Create a small MovieLens-shaped database under `dir`.
pub(crate) fn seed_movie_db(dir: &Path) -> PathBuf {
    let path = dir.join("moviedb.sqlite");
    let conn = Connection::open(&path).expect("create fixture db");
    conn.execute_batch(
        "CREATE TABLE movies (movieId INTEGER PRIMARY KEY, title TEXT, genres TEXT);
         CREATE TABLE ratings (userId INTEGER, movieId INTEGER, rating REAL, timestamp INTEGER);
         CREATE TABLE tags (userId INTEGER, movieId INTEGER, tag TEXT, timestamp INTEGER);
         CREATE TABLE links (movieId INTEGER, imdbId INTEGER, tmdbId INTEGER);

         INSERT INTO movies VALUES
            (1, 'Toy Story (1995)', 'Adventure|Animation|Children|Comedy|Fantasy'),
            (2, 'Jumanji (1995)', 'Adventure|Children|Fantasy'),
            (3, 'Grumpier Old Men (1995)', 'Comedy|Romance');
         INSERT INTO ratings VALUES
            (1, 1, 4.0, 964982703),
            (1, 3, 4.0, 964981247),
            (5, 1, 4.5, 847434962);
         INSERT INTO tags VALUES
            (2, 1, 'funny', 1445714994),
            (7, 3, 'funny', 1445714996),
            (18, 2, 'fantasy', 1455209816);
         INSERT INTO links VALUES
            (1, 114709, 862),
            (2, 113497, 8844),
            (3, 113228, 15602);",
    )
    .expect("seed fixture db");
    path
}
