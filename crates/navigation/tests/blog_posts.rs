//! Blog/Post scenario through the public API: a lazy `Blog.posts` navigation
//! over an in-memory store.

use std::sync::Arc;

use elif_navigation::{
    CollectionMember, ContextOptions, Entity, InMemoryContext, InMemoryStore, MetadataError, Model,
    ModelBuilder, ModelError, ModelSource, NavigationCollection, Queryable, QueryableCollectionAccessor,
    QuerySource, ReferenceMember, UnitOfWork,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Blog {
    id: i64,
    name: String,
    #[serde(skip)]
    posts: Queryable<Post>,
}

impl Entity for Blog {
    fn entity_name() -> &'static str {
        "Blog"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Post {
    id: i64,
    title: String,
    blog_id: Option<i64>,
}

impl Entity for Post {
    fn entity_name() -> &'static str {
        "Post"
    }
}

fn post(id: i64, blog_id: i64) -> Post {
    Post {
        id,
        title: format!("Post {}", id),
        blog_id: Some(blog_id),
    }
}

fn configure(builder: &mut ModelBuilder) -> Result<(), ModelError> {
    builder.entity::<Blog>()?.property("name")?;
    builder.entity::<Post>()?.property("title")?.property("blog_id")?;
    builder
        .has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("posts"), "blog_id")?
        .with_inverse(ReferenceMember::<Post, Blog>::new("blog"))?;
    Ok(())
}

struct Fixture {
    context: Arc<InMemoryContext>,
    model: Arc<Model>,
    blog: Blog,
}

impl Fixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let options = ContextOptions::builder().use_lazy_queryable().build();
        let context = Arc::new(InMemoryContext::new(Arc::new(InMemoryStore::new("blogging")), options));
        let unit_of_work: Arc<dyn UnitOfWork> = context.clone();
        let model = ModelSource::new().get_model(&unit_of_work, configure).unwrap();

        let blog = Blog {
            id: 1,
            name: "Test blog.".to_string(),
            posts: Queryable::new(),
        };
        context.add(Box::new(blog.clone())).unwrap();
        for post in [post(1, 1), post(2, 1), post(3, 1), post(4, 2)] {
            context.add(Box::new(post)).unwrap();
        }
        context.save_changes().unwrap();

        Self { context, model, blog }
    }

    fn posts(&self) -> &QueryableCollectionAccessor<Blog, Post> {
        self.model
            .find_navigation("Blog", "posts")
            .unwrap()
            .accessor_as::<QueryableCollectionAccessor<Blog, Post>>()
            .unwrap()
    }
}

#[test]
fn test_blog_posts_are_filtered_and_restartable() {
    let fixture = Fixture::new();
    let posts = fixture.posts().get(&fixture.blog);

    let titles: Vec<String> = posts.iter().map(|p| p.unwrap().title).collect();
    assert_eq!(titles, vec!["Post 1", "Post 2", "Post 3"]);

    // A second pass runs the query again and sees the same rows
    let again: Vec<Post> = posts.fetch().unwrap();
    assert_eq!(again.len(), 3);
    assert!(again.iter().all(|p| p.blog_id == Some(1)));

    assert_eq!(posts.count().unwrap(), 3);
    assert!(!posts.contains(&post(4, 2)).unwrap());
    assert!(posts.contains(&post(2, 1)).unwrap());
}

#[test]
fn test_create_enumerates_every_post() {
    let fixture = Fixture::new();
    let all = fixture.posts().create();

    assert_eq!(all.count().unwrap(), 4);
    let ids: Vec<i64> = all.fetch().unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn test_added_post_is_visible_after_save() {
    let fixture = Fixture::new();
    let posts = fixture.posts().get(&fixture.blog);

    let draft = Post {
        id: 5,
        title: "Post 5".to_string(),
        blog_id: None,
    };
    assert!(posts.add(draft.clone()).unwrap());
    assert!(!posts.add(draft.clone()).unwrap());
    assert_eq!(posts.count().unwrap(), 3);

    assert_eq!(fixture.context.save_changes().unwrap(), 1);
    assert_eq!(posts.count().unwrap(), 4);
    assert!(posts.contains(&draft).unwrap());

    // Already present now, so a further add is a no-op
    assert!(!posts.add(draft).unwrap());
    assert_eq!(fixture.context.pending_changes(), 0);
}

#[test]
fn test_remove_and_clear() {
    let fixture = Fixture::new();
    let mut posts = fixture.posts().get(&fixture.blog);

    assert!(NavigationCollection::remove(&mut posts, &post(1, 1)).unwrap());
    assert!(!NavigationCollection::remove(&mut posts, &post(4, 2)).unwrap());
    fixture.context.save_changes().unwrap();
    assert_eq!(NavigationCollection::len(&posts).unwrap(), 2);

    assert!(matches!(
        NavigationCollection::clear(&mut posts),
        Err(ModelError::NotSupported { .. })
    ));
    assert_eq!(NavigationCollection::to_vec(&posts).unwrap().len(), 2);
}

#[test]
fn test_conflicting_registrations_abort_the_build() {
    let options = ContextOptions::builder().use_lazy_queryable().build();
    let context: Arc<dyn UnitOfWork> =
        Arc::new(InMemoryContext::new(Arc::new(InMemoryStore::new("conflicts")), options));

    let result = ModelSource::new().get_model(&context, |builder| {
        configure(builder)?;
        builder
            .entity::<Post>()?
            .property("editor_blog_id")?;
        builder.has_many::<Blog, Post>(
            CollectionMember::<Blog, Queryable<Post>>::new("posts"),
            "editor_blog_id",
        )?;
        Ok(())
    });
    assert!(matches!(
        result,
        Err(ModelError::Metadata(MetadataError::ConflictingForeignKey { .. }))
    ));

    let result = ModelSource::new().get_model(&context, |builder| {
        configure(builder)?;
        builder.has_many::<Blog, Post>(CollectionMember::<Blog, Queryable<Post>>::new("name"), "blog_id")?;
        Ok(())
    });
    assert!(matches!(
        result,
        Err(ModelError::Metadata(MetadataError::ConflictingName { .. }))
    ));
}
