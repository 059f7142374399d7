//! Shared entities and models for unit tests

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{InMemoryContext, InMemoryStore, UnitOfWork};
use crate::entity::Entity;
use crate::error::ModelResult;
use crate::metadata::{Model, ModelBuilder};
use crate::options::ContextOptions;
use crate::relationships::{CollectionMember, Queryable, ReferenceMember};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub posts: Queryable<Post>,
}

impl Entity for Blog {
    fn entity_name() -> &'static str {
        "Blog"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    pub blog_id: Option<i64>,
    pub author_id: Option<i64>,
}

impl Entity for Post {
    fn entity_name() -> &'static str {
        "Post"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub posts: Vec<Post>,
}

impl Entity for Author {
    fn entity_name() -> &'static str {
        "Author"
    }
}

pub fn blog(id: i64) -> Blog {
    Blog {
        id,
        name: format!("Blog {}", id),
        posts: Queryable::new(),
    }
}

pub fn post(id: i64, blog_id: i64) -> Post {
    Post {
        id: Some(id),
        title: format!("Post {}", id),
        blog_id: Some(blog_id),
        author_id: None,
    }
}

pub fn author(id: i64) -> Author {
    Author {
        id,
        name: format!("Author {}", id),
        posts: Vec::new(),
    }
}

pub fn context(lazy_queryable: bool) -> Arc<InMemoryContext> {
    let options = if lazy_queryable {
        ContextOptions::builder().use_lazy_queryable().build()
    } else {
        ContextOptions::default()
    };
    Arc::new(InMemoryContext::new(Arc::new(InMemoryStore::new("fixtures")), options))
}

/// Blog, Author and Post shapes with no relationships
pub fn register_shapes(builder: &mut ModelBuilder) -> ModelResult<()> {
    builder.entity::<Blog>()?.property("name")?;
    builder.entity::<Author>()?.property("name")?;
    builder
        .entity::<Post>()?
        .property("title")?
        .property("blog_id")?
        .property("author_id")?;
    Ok(())
}

/// `Blog.posts` as a queryable navigation with `Post.blog` as its inverse,
/// and `Author.posts` as a materialized `Vec`
pub fn blog_model(context: Arc<dyn UnitOfWork>) -> ModelResult<Arc<Model>> {
    let mut builder = ModelBuilder::new(context);
    register_shapes(&mut builder)?;

    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")?
        .with_inverse(ReferenceMember::<Post, Blog>::new("blog"))?;

    builder.has_many::<Author, Post>(
        CollectionMember::<Author, Vec<Post>>::new("posts")
            .with_getter(|a| Some(&a.posts), |a| Some(&mut a.posts))
            .with_setter(|a, posts| a.posts = posts),
        "author_id",
    )?;

    builder.finish()
}
