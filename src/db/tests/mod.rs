mod bookmarks;
mod close;
mod credentials;
